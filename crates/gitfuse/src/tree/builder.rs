//! Projection of a catalog snapshot into the owner/repository levels.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::node::TreeNode;
use crate::catalog::{CatalogSnapshot, OwnerCatalog, RepositoryEntry};

/// An owner directory.
#[derive(Debug, Clone)]
pub struct OwnerDir {
    pub catalog: OwnerCatalog,
    /// Newest repository timestamp, or the epoch for an owner with none.
    pub mtime: DateTime<Utc>,
}

/// The root and owner/repository levels built from one snapshot.
///
/// Repository contents are not part of it; they are fetched lazily.
#[derive(Debug, Clone)]
pub struct VirtualTree {
    version: u64,
    root_mtime: DateTime<Utc>,
    owners: BTreeMap<String, OwnerDir>,
}

/// Build the virtual tree for a snapshot.
pub fn build_tree(snapshot: &CatalogSnapshot) -> VirtualTree {
    let owners: BTreeMap<String, OwnerDir> = snapshot
        .owners
        .iter()
        .map(|(name, catalog)| {
            let mtime = catalog
                .last_modified()
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            (
                name.clone(),
                OwnerDir {
                    catalog: catalog.clone(),
                    mtime,
                },
            )
        })
        .collect();

    let root_mtime = owners
        .values()
        .map(|o| o.mtime)
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    VirtualTree {
        version: snapshot.version,
        root_mtime,
        owners,
    }
}

impl VirtualTree {
    /// Version of the snapshot this tree was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root_mtime(&self) -> DateTime<Utc> {
        self.root_mtime
    }

    pub fn owner(&self, name: &str) -> Option<&OwnerDir> {
        self.owners.get(name)
    }

    pub fn owners(&self) -> impl Iterator<Item = &OwnerDir> {
        self.owners.values()
    }

    pub fn repository(&self, owner: &str, name: &str) -> Option<&RepositoryEntry> {
        self.owners.get(owner)?.catalog.repository(name)
    }

    /// Whether `node` (at the root, owner or repository level) still exists.
    pub fn contains(&self, node: &TreeNode) -> bool {
        match node {
            TreeNode::Root => true,
            TreeNode::Owner { name } => self.owners.contains_key(name),
            TreeNode::Repo { owner, name } => self.repository(owner, name).is_some(),
            TreeNode::Refs { owner, repo, .. }
            | TreeNode::Directory { owner, repo, .. }
            | TreeNode::File { owner, repo, .. } => self.repository(owner, repo).is_some(),
        }
    }

    /// Resolve `name` under the root or an owner.
    ///
    /// Owner segments are always the configured owner name, never the login
    /// spelling GitHub reports, so a looked-up node has the same id as the
    /// one `children` lists. Returns `None` for parents inside a repository;
    /// those are answered by the repository's file tree.
    pub fn lookup(&self, parent: &TreeNode, name: &str) -> Option<TreeNode> {
        match parent {
            TreeNode::Root => self
                .owners
                .get_key_value(name)
                .map(|(key, _)| TreeNode::Owner { name: key.clone() }),
            TreeNode::Owner { name: owner } => {
                self.repository(owner, name).map(|r| TreeNode::Repo {
                    owner: owner.clone(),
                    name: r.name.clone(),
                })
            }
            _ => None,
        }
    }

    /// Children of the root or an owner, ordered by name.
    pub fn children(&self, node: &TreeNode) -> Option<Vec<TreeNode>> {
        match node {
            TreeNode::Root => Some(
                self.owners
                    .keys()
                    .map(|name| TreeNode::Owner { name: name.clone() })
                    .collect(),
            ),
            TreeNode::Owner { name } => self.owners.get(name).map(|o| {
                o.catalog
                    .repositories
                    .iter()
                    .map(|r| TreeNode::Repo {
                        owner: name.clone(),
                        name: r.name.clone(),
                    })
                    .collect()
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Owner, OwnerState, Visibility};
    use crate::source::RefKind;
    use crate::tree::Checkout;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn entry(owner: &str, name: &str, day: u32) -> RepositoryEntry {
        let ts = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        RepositoryEntry {
            owner: owner.to_string(),
            name: name.to_string(),
            default_branch: "main".to_string(),
            size_kb: 1,
            last_modified: ts,
            created_at: ts,
            visibility: Visibility::Public,
        }
    }

    fn snapshot() -> CatalogSnapshot {
        let mut snap =
            CatalogSnapshot::initial(&[Owner::user("alice"), Owner::organization("acme")]);
        let alice = snap.owners.get_mut("alice").unwrap();
        alice.state = OwnerState::Fresh;
        alice.repositories = Arc::from(vec![entry("alice", "demo", 5), entry("alice", "tools", 2)]);
        snap.version = 3;
        snap
    }

    #[test]
    fn test_root_lists_all_owners_even_without_repos() {
        let tree = build_tree(&snapshot());
        let names: Vec<_> = tree
            .children(&TreeNode::Root)
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(names, vec!["acme", "alice"]);
        assert_eq!(tree.version(), 3);
    }

    #[test]
    fn test_lookup_owner_then_repo() {
        let tree = build_tree(&snapshot());
        let owner = tree.lookup(&TreeNode::Root, "alice").unwrap();
        let repo = tree.lookup(&owner, "demo").unwrap();
        assert_eq!(
            repo,
            TreeNode::Repo {
                owner: "alice".to_string(),
                name: "demo".to_string()
            }
        );
        assert!(tree.lookup(&owner, "missing").is_none());
        assert!(tree.lookup(&TreeNode::Root, "bob").is_none());
        assert!(tree.lookup(&repo, "README.md").is_none());
    }

    #[test]
    fn test_lookup_uses_configured_owner_spelling() {
        let mut snap = CatalogSnapshot::initial(&[Owner::user("Alice")]);
        let owner = snap.owners.get_mut("Alice").unwrap();
        owner.state = OwnerState::Fresh;
        owner.repositories = Arc::from(vec![entry("alice", "demo", 5)]);
        let tree = build_tree(&snap);

        let owner = tree.lookup(&TreeNode::Root, "Alice").unwrap();
        let repo = tree.lookup(&owner, "demo").unwrap();
        let listed = tree.children(&owner).unwrap();

        assert_eq!(repo.full_path(), "Alice/demo");
        assert_eq!(listed, vec![repo.clone()]);
        assert!(tree.contains(&repo));
    }

    #[test]
    fn test_mtimes_roll_up() {
        let tree = build_tree(&snapshot());
        let day5 = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(tree.owner("alice").unwrap().mtime, day5);
        assert_eq!(
            tree.owner("acme").unwrap().mtime,
            DateTime::<Utc>::UNIX_EPOCH
        );
        assert_eq!(tree.root_mtime(), day5);
    }

    #[test]
    fn test_contains_follows_catalog() {
        let tree = build_tree(&snapshot());
        assert!(tree.contains(&TreeNode::Root));
        assert!(tree.contains(&TreeNode::Owner {
            name: "acme".to_string()
        }));
        assert!(!tree.contains(&TreeNode::Repo {
            owner: "acme".to_string(),
            name: "demo".to_string()
        }));
        assert!(tree.contains(&TreeNode::Directory {
            owner: "alice".to_string(),
            repo: "tools".to_string(),
            checkout: Checkout::Default,
            path: "src".to_string()
        }));
        assert!(!tree.contains(&TreeNode::Refs {
            owner: "alice".to_string(),
            repo: "gone".to_string(),
            kind: RefKind::Tag,
        }));
    }
}
