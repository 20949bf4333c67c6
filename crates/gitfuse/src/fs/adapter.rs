//! Filesystem operations over the published catalog.
//!
//! [`GitHubFs`] answers lookups, listings, attribute queries and reads
//! against whatever snapshot is current when the call arrives. Node ids are
//! path-derived, so an id handed out before a refresh still resolves after
//! it, or fails with [`FsError::NotFound`] if the path is gone.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use quick_cache::sync::Cache;

use super::attr::{Attributes, NodeKind, Ownership};
use super::error::FsError;
use crate::catalog::CatalogStore;
use crate::github::{GitHubError, short_error_message};
use crate::source::{RefKind, RepositorySource};
use crate::tree::{
    BlobCache, Checkout, DEFAULT_BLOB_CAPACITY, NodeId, RefCache, RefList, RefsKey,
    RepoFileCache, RepoFiles, RepoKey, RepoNode, TreeNode, VirtualTree, build_tree,
};

/// Default bound on a lazy file tree or blob fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Commit timestamps kept for branch and tag directories.
const COMMIT_TIME_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct FsOptions {
    /// Bound on fetching a repository's file tree or a blob.
    pub fetch_timeout: Duration,
    /// Number of blobs kept in memory.
    pub blob_capacity: usize,
    pub ownership: Ownership,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            blob_capacity: DEFAULT_BLOB_CAPACITY,
            ownership: Ownership::current(),
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub node: TreeNode,
}

impl DirEntry {
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn kind(&self) -> NodeKind {
        if self.node.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

fn repo_node(
    owner: &str,
    repo: &str,
    checkout: &Checkout,
    path: String,
    node: &RepoNode,
) -> TreeNode {
    match node {
        RepoNode::Directory => TreeNode::Directory {
            owner: owner.to_string(),
            repo: repo.to_string(),
            checkout: checkout.clone(),
            path,
        },
        RepoNode::File { sha, size } => TreeNode::File {
            owner: owner.to_string(),
            repo: repo.to_string(),
            checkout: checkout.clone(),
            path,
            sha: sha.clone(),
            size: *size,
        },
    }
}

fn ref_root(owner: &str, repo: &str, kind: RefKind, entry: &str) -> TreeNode {
    TreeNode::Directory {
        owner: owner.to_string(),
        repo: repo.to_string(),
        checkout: Checkout::Ref {
            kind,
            entry: entry.to_string(),
        },
        path: String::new(),
    }
}

/// Read-only filesystem over a [`CatalogStore`].
///
/// Safe to share across tasks; every operation takes `&self`.
pub struct GitHubFs {
    store: CatalogStore,
    source: Arc<dyn RepositorySource>,
    options: FsOptions,
    files: RepoFileCache,
    refs: RefCache,
    commit_times: Cache<String, DateTime<Utc>>,
    blobs: BlobCache,
    tree: Mutex<Arc<VirtualTree>>,
    nodes: Mutex<HashMap<NodeId, TreeNode>>,
}

impl GitHubFs {
    pub fn new(store: CatalogStore, source: Arc<dyn RepositorySource>, options: FsOptions) -> Self {
        let tree = Arc::new(build_tree(&store.current()));
        Self {
            store,
            source,
            blobs: BlobCache::new(options.blob_capacity),
            options,
            files: RepoFileCache::new(),
            refs: RefCache::new(),
            commit_times: Cache::new(COMMIT_TIME_CAPACITY),
            tree: Mutex::new(tree),
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// The tree for the current snapshot, rebuilt when a newer one was
    /// published since the last call.
    pub fn tree(&self) -> Arc<VirtualTree> {
        let snapshot = self.store.current();
        let mut tree = lock(&self.tree);
        if snapshot.version > tree.version() {
            let rebuilt = Arc::new(build_tree(&snapshot));
            // Listings for removed repositories or a changed default branch
            // can never be served again.
            self.files.retain(|key| {
                rebuilt
                    .repository(&key.owner, &key.repo)
                    .is_some_and(|r| {
                        key.checkout != Checkout::Default || r.default_branch == key.git_ref
                    })
            });
            self.refs
                .retain(|key| rebuilt.repository(&key.owner, &key.repo).is_some());
            tracing::debug!(version = rebuilt.version(), "Rebuilt virtual tree");
            *tree = rebuilt;
        }
        Arc::clone(&tree)
    }

    fn register(&self, node: &TreeNode) {
        if !matches!(node, TreeNode::Root) {
            lock(&self.nodes).insert(node.id(), node.clone());
        }
    }

    fn registered(&self, id: NodeId) -> Result<TreeNode, FsError> {
        if id == NodeId::ROOT {
            return Ok(TreeNode::Root);
        }
        lock(&self.nodes).get(&id).cloned().ok_or(FsError::NotFound)
    }

    /// Drop an id the kernel no longer references.
    pub fn forget(&self, id: NodeId) {
        if id != NodeId::ROOT {
            lock(&self.nodes).remove(&id);
        }
    }

    /// Number of ids handed out by `lookup` and not yet forgotten.
    pub fn registered_len(&self) -> usize {
        lock(&self.nodes).len()
    }

    /// Resolve `id` against the current snapshot.
    pub async fn node(&self, id: NodeId) -> Result<TreeNode, FsError> {
        let node = self.registered(id)?;
        let tree = self.tree();
        self.revalidate(&tree, node).await
    }

    /// Check `node` still exists and refresh its blob identity.
    async fn revalidate(&self, tree: &VirtualTree, node: TreeNode) -> Result<TreeNode, FsError> {
        match node {
            TreeNode::Root | TreeNode::Owner { .. } | TreeNode::Repo { .. } | TreeNode::Refs { .. } => {
                if tree.contains(&node) {
                    Ok(node)
                } else {
                    Err(FsError::NotFound)
                }
            }
            // A ref's own directory exists as long as the ref does, even when
            // its file tree cannot be fetched.
            TreeNode::Directory {
                checkout: Checkout::Ref { kind, ref entry },
                ref path,
                ref owner,
                ref repo,
            } if path.is_empty() => {
                let refs = self
                    .ref_list(tree, owner, repo, kind)
                    .await
                    .ok_or(FsError::NotFound)?;
                if refs.get(entry).is_some() {
                    Ok(node)
                } else {
                    Err(FsError::NotFound)
                }
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
            } => {
                let files = self
                    .checkout_files(tree, &owner, &repo, &checkout)
                    .await
                    .ok_or(FsError::NotFound)?;
                let current = files.get(&path).ok_or(FsError::NotFound)?;
                Ok(repo_node(&owner, &repo, &checkout, path, current))
            }
        }
    }

    /// Await a lazy fetch under the fetch timeout, logging any failure.
    async fn within_timeout<T>(
        &self,
        what: &str,
        owner: &str,
        repo: &str,
        fetch: impl Future<Output = Result<T, GitHubError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.options.fetch_timeout, fetch).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(
                    owner = %owner,
                    repo = %repo,
                    "Failed to fetch {}, listing as empty: {}",
                    what,
                    short_error_message(&e)
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    owner = %owner,
                    repo = %repo,
                    timeout = ?self.options.fetch_timeout,
                    "Timed out fetching {}, listing as empty",
                    what
                );
                None
            }
        }
    }

    /// The file tree of a checkout, fetching it on first access.
    ///
    /// `None` when the repository or ref is gone or the fetch failed; a
    /// failed fetch is retried by the next caller.
    async fn checkout_files(
        &self,
        tree: &VirtualTree,
        owner: &str,
        repo: &str,
        checkout: &Checkout,
    ) -> Option<Arc<RepoFiles>> {
        let entry = tree.repository(owner, repo)?;
        let last_modified = entry.last_modified;
        let (git_ref, fresh_after) = match checkout {
            Checkout::Default => (entry.default_branch.clone(), last_modified),
            // Pinned to a commit, so never stale.
            Checkout::Ref { kind, entry: name } => {
                let refs = self.ref_list(tree, owner, repo, *kind).await?;
                (refs.get(name)?.sha.clone(), DateTime::<Utc>::UNIX_EPOCH)
            }
        };
        let key = RepoKey::at(owner, repo, checkout.clone(), git_ref);

        let source = &self.source;
        let git_ref = key.git_ref.as_str();
        let fetch = self.files.get_or_fetch(&key, fresh_after, move || async move {
            let entries = source.fetch_file_tree(owner, repo, git_ref).await?;
            // Never older than the catalog entry that triggered the fetch.
            let fetched_at = Utc::now().max(last_modified);
            Ok::<_, GitHubError>(RepoFiles::from_entries(&entries, fetched_at))
        });
        self.within_timeout("file tree", owner, repo, fetch).await
    }

    /// The repository's branches or tags, refetched after every push.
    async fn ref_list(
        &self,
        tree: &VirtualTree,
        owner: &str,
        repo: &str,
        kind: RefKind,
    ) -> Option<Arc<RefList>> {
        let last_modified = tree.repository(owner, repo)?.last_modified;
        let key = RefsKey::new(owner, repo, kind);

        let source = &self.source;
        let fetch = self.refs.get_or_fetch(&key, last_modified, move || async move {
            let refs = source.list_refs(owner, repo, kind).await?;
            let fetched_at = Utc::now().max(last_modified);
            Ok::<_, GitHubError>(RefList::from_refs(refs, fetched_at))
        });
        self.within_timeout(kind.dir_name(), owner, repo, fetch)
            .await
    }

    async fn commit_time(&self, owner: &str, repo: &str, sha: &str) -> Option<DateTime<Utc>> {
        if let Some(time) = self.commit_times.get(sha) {
            return Some(time);
        }
        let fetch = self.source.fetch_commit_time(owner, repo, sha);
        let time = self.within_timeout("commit time", owner, repo, fetch).await?;
        self.commit_times.insert(sha.to_string(), time);
        Some(time)
    }

    /// Modification time for everything under a checkout.
    ///
    /// Branches and tags use their commit's date, falling back to the
    /// repository's when it cannot be fetched.
    async fn checkout_mtime(
        &self,
        tree: &VirtualTree,
        owner: &str,
        repo: &str,
        checkout: &Checkout,
    ) -> Option<DateTime<Utc>> {
        let fallback = tree.repository(owner, repo)?.last_modified;
        let Checkout::Ref { kind, entry } = checkout else {
            return Some(fallback);
        };
        let Some(sha) = self
            .ref_list(tree, owner, repo, *kind)
            .await
            .and_then(|refs| refs.get(entry).map(|r| r.sha.clone()))
        else {
            return Some(fallback);
        };
        Some(self.commit_time(owner, repo, &sha).await.unwrap_or(fallback))
    }

    async fn lookup_in_checkout(
        &self,
        tree: &VirtualTree,
        owner: &str,
        repo: &str,
        checkout: &Checkout,
        dir: &str,
        name: &str,
    ) -> Result<TreeNode, FsError> {
        let files = self
            .checkout_files(tree, owner, repo, checkout)
            .await
            .ok_or(FsError::NotFound)?;
        let path = join_path(dir, name);
        let node = files.get(&path).ok_or(FsError::NotFound)?;
        Ok(repo_node(owner, repo, checkout, path, node))
    }

    async fn list_checkout_dir(
        &self,
        tree: &VirtualTree,
        owner: &str,
        repo: &str,
        checkout: &Checkout,
        dir: &str,
    ) -> Vec<DirEntry> {
        let Some(files) = self.checkout_files(tree, owner, repo, checkout).await else {
            return Vec::new();
        };
        let Some(children) = files.children(dir) else {
            return Vec::new();
        };
        children
            .iter()
            .map(|(name, child)| DirEntry {
                name: name.clone(),
                node: repo_node(owner, repo, checkout, join_path(dir, name), child),
            })
            .collect()
    }

    /// The repository root: the default branch's files plus `branches/`
    /// and `tags/`. A file of the same name hides the ref directory.
    async fn list_repo_root(&self, tree: &VirtualTree, owner: &str, repo: &str) -> Vec<DirEntry> {
        let mut entries = self
            .list_checkout_dir(tree, owner, repo, &Checkout::Default, "")
            .await;
        for kind in RefKind::ALL {
            if entries.iter().any(|e| e.name == kind.dir_name()) {
                continue;
            }
            entries.push(DirEntry {
                name: kind.dir_name().to_string(),
                node: TreeNode::Refs {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    kind,
                },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    async fn list_ref_dirs(
        &self,
        tree: &VirtualTree,
        owner: &str,
        repo: &str,
        kind: RefKind,
    ) -> Vec<DirEntry> {
        let Some(refs) = self.ref_list(tree, owner, repo, kind).await else {
            return Vec::new();
        };
        refs.iter()
            .map(|(entry, _)| DirEntry {
                name: entry.to_string(),
                node: ref_root(owner, repo, kind, entry),
            })
            .collect()
    }

    /// Resolve `name` inside the directory `parent`.
    ///
    /// This is the only operation that hands ids to the kernel; each one
    /// stays resolvable until [`forget`](Self::forget).
    pub async fn lookup(&self, parent: NodeId, name: &str) -> Result<TreeNode, FsError> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(FsError::NotFound);
        }

        let tree = self.tree();
        let parent = self.revalidate(&tree, self.registered(parent)?).await?;

        let child = match &parent {
            TreeNode::Root | TreeNode::Owner { .. } => {
                tree.lookup(&parent, name).ok_or(FsError::NotFound)?
            }
            TreeNode::Repo { owner, name: repo } => {
                let found = self
                    .lookup_in_checkout(&tree, owner, repo, &Checkout::Default, "", name)
                    .await;
                match (found, RefKind::from_dir_name(name)) {
                    (Ok(node), _) => node,
                    (Err(_), Some(kind)) => TreeNode::Refs {
                        owner: owner.clone(),
                        repo: repo.clone(),
                        kind,
                    },
                    (Err(e), None) => return Err(e),
                }
            }
            TreeNode::Refs { owner, repo, kind } => {
                let refs = self
                    .ref_list(&tree, owner, repo, *kind)
                    .await
                    .ok_or(FsError::NotFound)?;
                refs.get(name).ok_or(FsError::NotFound)?;
                ref_root(owner, repo, *kind, name)
            }
            TreeNode::Directory {
                owner,
                repo,
                checkout,
                path,
            } => {
                self.lookup_in_checkout(&tree, owner, repo, checkout, path, name)
                    .await?
            }
            TreeNode::File { .. } => return Err(FsError::NotADirectory),
        };

        self.register(&child);
        Ok(child)
    }

    /// List the directory `id`, ordered by name.
    ///
    /// A repository whose file tree cannot be fetched lists as empty. Listed
    /// children are not registered; the kernel looks each one up before use.
    pub async fn readdir(&self, id: NodeId) -> Result<Vec<DirEntry>, FsError> {
        let tree = self.tree();
        let node = self.revalidate(&tree, self.registered(id)?).await?;

        match &node {
            TreeNode::Root | TreeNode::Owner { .. } => Ok(tree
                .children(&node)
                .unwrap_or_default()
                .into_iter()
                .map(|child| DirEntry {
                    name: child.name().to_string(),
                    node: child,
                })
                .collect()),
            TreeNode::Repo { owner, name } => Ok(self.list_repo_root(&tree, owner, name).await),
            TreeNode::Refs { owner, repo, kind } => {
                Ok(self.list_ref_dirs(&tree, owner, repo, *kind).await)
            }
            TreeNode::Directory {
                owner,
                repo,
                checkout,
                path,
            } => Ok(self
                .list_checkout_dir(&tree, owner, repo, checkout, path)
                .await),
            TreeNode::File { .. } => Err(FsError::NotADirectory),
        }
    }

    /// Attributes of `id` in the current snapshot.
    pub async fn getattr(&self, id: NodeId) -> Result<Attributes, FsError> {
        let tree = self.tree();
        let node = self.revalidate(&tree, self.registered(id)?).await?;
        self.attributes(&tree, &node).await
    }

    async fn attributes(&self, tree: &VirtualTree, node: &TreeNode) -> Result<Attributes, FsError> {
        let ownership = self.options.ownership;
        let id = node.id();

        match node {
            TreeNode::Root => Ok(Attributes::directory(id, 0, tree.root_mtime(), ownership)),
            TreeNode::Owner { name } => tree
                .owner(name)
                .map(|o| Attributes::directory(id, 0, o.mtime, ownership))
                .ok_or(FsError::NotFound),
            TreeNode::Repo { owner, name } => tree
                .repository(owner, name)
                .map(|r| Attributes::directory(id, r.size_bytes(), r.last_modified, ownership))
                .ok_or(FsError::NotFound),
            TreeNode::Refs { owner, repo, .. } => tree
                .repository(owner, repo)
                .map(|r| Attributes::directory(id, 0, r.last_modified, ownership))
                .ok_or(FsError::NotFound),
            TreeNode::Directory {
                owner,
                repo,
                checkout,
                ..
            } => self
                .checkout_mtime(tree, owner, repo, checkout)
                .await
                .map(|mtime| Attributes::directory(id, 0, mtime, ownership))
                .ok_or(FsError::NotFound),
            TreeNode::File {
                owner,
                repo,
                checkout,
                size,
                ..
            } => self
                .checkout_mtime(tree, owner, repo, checkout)
                .await
                .map(|mtime| Attributes::file(id, *size, mtime, ownership))
                .ok_or(FsError::NotFound),
        }
    }

    /// Check an open request. Any write access fails with [`FsError::ReadOnly`].
    pub async fn open(&self, id: NodeId, flags: i32) -> Result<(), FsError> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY || flags & libc::O_TRUNC != 0 {
            return Err(self.reject_mutation("open"));
        }
        self.node(id).await.map(|_| ())
    }

    /// Read up to `size` bytes of file `id` starting at `offset`.
    pub async fn read(&self, id: NodeId, offset: u64, size: u32) -> Result<Vec<u8>, FsError> {
        let node = self.node(id).await?;
        let TreeNode::File {
            owner, repo, sha, ..
        } = node
        else {
            return Err(FsError::IsADirectory);
        };

        let blob = self.blob(&owner, &repo, &sha).await?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(blob.len());
        let end = start.saturating_add(size as usize).min(blob.len());
        Ok(blob[start..end].to_vec())
    }

    async fn blob(&self, owner: &str, repo: &str, sha: &str) -> Result<Arc<[u8]>, FsError> {
        if let Some(bytes) = self.blobs.get(sha) {
            return Ok(bytes);
        }

        let resource = format!("{}/{} blob {}", owner, repo, sha);
        let fetch = self.source.fetch_blob(owner, repo, sha);
        let bytes: Arc<[u8]> = match tokio::time::timeout(self.options.fetch_timeout, fetch).await {
            Ok(Ok(bytes)) => Arc::from(bytes),
            Ok(Err(e)) => {
                let message = short_error_message(&e);
                tracing::warn!(owner = %owner, repo = %repo, sha = %sha, "Failed to fetch blob: {}", message);
                return Err(FsError::io(resource, message));
            }
            Err(_) => {
                tracing::warn!(owner = %owner, repo = %repo, sha = %sha, "Timed out fetching blob");
                return Err(FsError::io(resource, "timed out"));
            }
        };

        self.blobs.insert(sha, Arc::clone(&bytes));
        Ok(bytes)
    }

    /// The answer to every mutating request.
    pub fn reject_mutation(&self, operation: &str) -> FsError {
        tracing::debug!(operation, "Rejecting write on read-only filesystem");
        FsError::ReadOnly
    }
}

impl std::fmt::Debug for GitHubFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubFs")
            .field("store", &self.store)
            .field("options", &self.options)
            .field("cached_repos", &self.files.len())
            .field("cached_ref_lists", &self.refs.len())
            .field("blobs", &self.blobs)
            .finish()
    }
}
