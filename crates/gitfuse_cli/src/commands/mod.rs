pub(crate) mod limits;
pub(crate) mod list;
pub(crate) mod meta;
pub(crate) mod mount;
pub(crate) mod shared;
