use std::fmt;

use sha2::{Digest, Sha256};

use crate::source::RefKind;

/// Stable identifier of a node, used as the inode number.
///
/// Derived from the node's path alone, so the same path maps to the same id
/// across refreshes and restarts. The root is always 1; no node gets 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub const ROOT: NodeId = NodeId(1);

    /// Id for a slash-separated path relative to the mount root.
    pub fn for_path(path: &str) -> NodeId {
        if path.is_empty() {
            return Self::ROOT;
        }

        let digest = Sha256::digest(path.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let raw = u64::from_be_bytes(bytes);

        // 0 is reserved by the kernel and 1 is the root.
        if raw < 2 { NodeId(raw + 2) } else { NodeId(raw) }
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directory name for a branch or tag.
///
/// Ref names may contain `/` (`feature/login`), which cannot appear in a path
/// component, so it is written as `%2F`. A literal `%` becomes `%25` to keep
/// the mapping one-to-one.
pub fn ref_entry_name(name: &str) -> String {
    name.replace('%', "%25").replace('/', "%2F")
}

/// Which commit a repository's contents are read at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Checkout {
    /// The default branch, shown directly under the repository.
    Default,
    /// A branch or tag, shown under `branches/<entry>` or `tags/<entry>`.
    Ref { kind: RefKind, entry: String },
}

/// A node of the virtual tree.
///
/// `Directory` and `File` live inside a repository; `path` is relative to
/// the root of their checkout. A ref's own directory is the `Directory` with
/// an empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Root,
    Owner {
        name: String,
    },
    Repo {
        owner: String,
        name: String,
    },
    /// `branches/` or `tags/` inside a repository.
    Refs {
        owner: String,
        repo: String,
        kind: RefKind,
    },
    Directory {
        owner: String,
        repo: String,
        checkout: Checkout,
        path: String,
    },
    File {
        owner: String,
        repo: String,
        checkout: Checkout,
        path: String,
        sha: String,
        size: u64,
    },
}

fn checkout_path(owner: &str, repo: &str, checkout: &Checkout, path: &str) -> String {
    let mut full = format!("{}/{}", owner, repo);
    if let Checkout::Ref { kind, entry } = checkout {
        full.push('/');
        full.push_str(kind.dir_name());
        full.push('/');
        full.push_str(entry);
    }
    if !path.is_empty() {
        full.push('/');
        full.push_str(path);
    }
    full
}

impl TreeNode {
    /// Path relative to the mount root, without a leading slash.
    pub fn full_path(&self) -> String {
        match self {
            TreeNode::Root => String::new(),
            TreeNode::Owner { name } => name.clone(),
            TreeNode::Repo { owner, name } => format!("{}/{}", owner, name),
            TreeNode::Refs { owner, repo, kind } => {
                format!("{}/{}/{}", owner, repo, kind.dir_name())
            }
            TreeNode::Directory {
                owner,
                repo,
                checkout,
                path,
            }
            | TreeNode::File {
                owner,
                repo,
                checkout,
                path,
                ..
            } => checkout_path(owner, repo, checkout, path),
        }
    }

    pub fn id(&self) -> NodeId {
        NodeId::for_path(&self.full_path())
    }

    /// Id of the containing directory. The root is its own parent.
    pub fn parent_id(&self) -> NodeId {
        match self.full_path().rsplit_once('/') {
            Some((parent, _)) => NodeId::for_path(parent),
            None => NodeId::ROOT,
        }
    }

    /// Last path component; empty for the root.
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Root => "",
            TreeNode::Owner { name } | TreeNode::Repo { name, .. } => name,
            TreeNode::Refs { kind, .. } => kind.dir_name(),
            TreeNode::Directory {
                checkout: Checkout::Ref { entry, .. },
                path,
                ..
            } if path.is_empty() => entry,
            TreeNode::Directory { path, .. } | TreeNode::File { path, .. } => {
                path.rsplit('/').next().unwrap_or(path)
            }
        }
    }

    pub fn is_dir(&self) -> bool {
        !matches!(self, TreeNode::File { .. })
    }

    /// Owner and repository a node belongs to, if it is inside one.
    pub fn repository(&self) -> Option<(&str, &str)> {
        match self {
            TreeNode::Repo { owner, name } => Some((owner, name)),
            TreeNode::Refs { owner, repo, .. }
            | TreeNode::Directory { owner, repo, .. }
            | TreeNode::File { owner, repo, .. } => Some((owner, repo)),
            TreeNode::Root | TreeNode::Owner { .. } => None,
        }
    }

    /// The checkout a node's contents are read at, if it has one.
    pub fn checkout(&self) -> Option<&Checkout> {
        match self {
            TreeNode::Directory { checkout, .. } | TreeNode::File { checkout, .. } => {
                Some(checkout)
            }
            _ => None,
        }
    }
}
