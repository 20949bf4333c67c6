//! The data source boundary between the catalog and GitHub.
//!
//! The refresh scheduler and the filesystem only talk to a
//! [`RepositorySource`]. [`GitHubClient`](crate::github::GitHubClient) is the
//! production implementation; tests substitute an in-memory one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::catalog::{Owner, RepositoryEntry};
use crate::github::GitHubError;

/// Kind of an entry in a repository's file tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeEntryKind {
    /// A regular or executable file.
    Blob,
    /// A directory.
    Tree,
    /// A symbolic link (the blob holds the link target).
    Symlink,
    /// A git submodule; exposed as an empty directory.
    Submodule,
}

/// One path in a repository's recursive file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Slash-separated path relative to the repository root.
    pub path: String,
    pub kind: TreeEntryKind,
    pub sha: String,
    /// Blob size in bytes; zero for directories.
    pub size: u64,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: TreeEntryKind::Blob,
            sha: sha.into(),
            size,
        }
    }

    pub fn tree(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: TreeEntryKind::Tree,
            sha: sha.into(),
            size: 0,
        }
    }
}

/// Which family of named refs a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefKind {
    Branch,
    Tag,
}

impl RefKind {
    pub const ALL: [RefKind; 2] = [RefKind::Branch, RefKind::Tag];

    /// Name of the directory that lists refs of this kind inside a repository.
    pub fn dir_name(self) -> &'static str {
        match self {
            RefKind::Branch => "branches",
            RefKind::Tag => "tags",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir_name() == name)
    }
}

/// A branch or tag and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    pub name: String,
    pub sha: String,
}

impl GitRef {
    pub fn new(name: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sha: sha.into(),
        }
    }
}

/// Read access to repositories on a code host.
#[async_trait]
pub trait RepositorySource: Send + Sync + 'static {
    /// List an owner's repositories, ordered by name.
    async fn list_repositories(&self, owner: &Owner) -> Result<Vec<RepositoryEntry>, GitHubError>;

    /// Fetch the full recursive file tree at `git_ref`.
    ///
    /// An empty repository yields an empty tree.
    async fn fetch_file_tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<Vec<TreeEntry>, GitHubError>;

    /// List every branch or tag of a repository, ordered by name.
    async fn list_refs(
        &self,
        owner: &str,
        repo: &str,
        kind: RefKind,
    ) -> Result<Vec<GitRef>, GitHubError>;

    /// When the commit `sha` was made.
    async fn fetch_commit_time(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<DateTime<Utc>, GitHubError>;

    /// Fetch the raw contents of a blob.
    async fn fetch_blob(&self, owner: &str, repo: &str, sha: &str)
    -> Result<Vec<u8>, GitHubError>;
}
