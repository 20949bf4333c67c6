//! The virtual directory tree.
//!
//! The root and owner/repository levels are projected from a catalog
//! snapshot by [`build_tree`]. Below a repository, contents come from a
//! lazily fetched [`RepoFiles`] listing held in a [`RepoFileCache`], and the
//! `branches/` and `tags/` directories from a [`RefList`] in a [`RefCache`].

mod builder;
mod files;
mod node;

pub use builder::{OwnerDir, VirtualTree, build_tree};
pub use files::{
    BlobCache, CacheKey, DEFAULT_BLOB_CAPACITY, Fetched, LazyCache, MAX_CACHED_BLOB_BYTES,
    RefCache, RefList, RefsKey, RepoFileCache, RepoFiles, RepoKey, RepoNode,
};
pub use node::{Checkout, NodeId, TreeNode, ref_entry_name};
