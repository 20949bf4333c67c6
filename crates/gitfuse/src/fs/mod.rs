//! The read-only filesystem.
//!
//! # Module Structure
//!
//! - [`adapter`] - `GitHubFs`: lookup, readdir, getattr, open and read over the current snapshot
//! - [`attr`] - Node attributes and permission bits
//! - [`error`] - `FsError` and its errno mapping
//! - `fuse` - The kernel binding (Linux, `fuse` feature)

mod adapter;
mod attr;
mod error;
#[cfg(all(feature = "fuse", target_os = "linux"))]
mod fuse;

pub use adapter::{DEFAULT_FETCH_TIMEOUT, DirEntry, FsOptions, GitHubFs};
pub use attr::{Attributes, BLOCK_SIZE, DIR_PERM, FILE_PERM, NodeKind, Ownership};
pub use error::FsError;
#[cfg(all(feature = "fuse", target_os = "linux"))]
pub use fuse::{FS_NAME, FuseAdapter, MountOptions, mount};
