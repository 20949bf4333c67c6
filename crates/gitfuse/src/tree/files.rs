//! Lazily fetched repository contents and their caches.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use quick_cache::sync::Cache;

use super::node::{Checkout, ref_entry_name};
use crate::source::{GitRef, RefKind, TreeEntry, TreeEntryKind};

/// Default number of blobs kept in memory.
pub const DEFAULT_BLOB_CAPACITY: usize = 512;

/// Blobs larger than this bypass the main cache.
pub const MAX_CACHED_BLOB_BYTES: usize = 8 * 1024 * 1024;

/// A path inside a repository's file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoNode {
    Directory,
    File { sha: String, size: u64 },
}

impl RepoNode {
    pub fn is_dir(&self) -> bool {
        matches!(self, RepoNode::Directory)
    }
}

/// The file tree of one repository at one ref.
#[derive(Debug, Clone)]
pub struct RepoFiles {
    fetched_at: DateTime<Utc>,
    nodes: HashMap<String, RepoNode>,
    children: HashMap<String, BTreeMap<String, RepoNode>>,
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

impl RepoFiles {
    /// Build from a recursive tree listing.
    ///
    /// Parent directories missing from the listing are created. Submodules
    /// become empty directories and symlinks become files. Entries with
    /// malformed paths are dropped.
    pub fn from_entries(entries: &[TreeEntry], fetched_at: DateTime<Utc>) -> Self {
        let mut files = Self {
            fetched_at,
            nodes: HashMap::new(),
            children: HashMap::new(),
        };
        files.nodes.insert(String::new(), RepoNode::Directory);
        files.children.insert(String::new(), BTreeMap::new());

        for entry in entries {
            if !is_valid_path(&entry.path) {
                tracing::debug!(path = %entry.path, "Skipping tree entry with unusable path");
                continue;
            }
            let node = match entry.kind {
                TreeEntryKind::Tree | TreeEntryKind::Submodule => RepoNode::Directory,
                TreeEntryKind::Blob | TreeEntryKind::Symlink => RepoNode::File {
                    sha: entry.sha.clone(),
                    size: entry.size,
                },
            };
            files.insert(&entry.path, node);
        }

        files
    }

    fn insert(&mut self, path: &str, node: RepoNode) {
        let (parent, name) = split_parent(path);
        if !self.nodes.contains_key(parent) {
            self.insert(parent, RepoNode::Directory);
        }

        // A directory already registered (implicitly or not) wins over a
        // second entry with the same path.
        if let Some(existing) = self.nodes.get(path)
            && existing.is_dir()
        {
            return;
        }

        if node.is_dir() {
            self.children.entry(path.to_string()).or_default();
        }
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(name.to_string(), node.clone());
        self.nodes.insert(path.to_string(), node);
    }

    /// When the listing was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// The node at `path`; `""` is the repository root.
    pub fn get(&self, path: &str) -> Option<&RepoNode> {
        self.nodes.get(path)
    }

    /// Children of the directory at `path`, ordered by name.
    pub fn children(&self, path: &str) -> Option<&BTreeMap<String, RepoNode>> {
        self.children.get(path)
    }

    /// Number of files and directories, not counting the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cached value that remembers when it was fetched.
pub trait Fetched {
    fn fetched_at(&self) -> DateTime<Utc>;
}

impl Fetched for RepoFiles {
    fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Branches or tags of one repository, keyed by directory name.
#[derive(Debug, Clone)]
pub struct RefList {
    fetched_at: DateTime<Utc>,
    refs: BTreeMap<String, GitRef>,
}

impl RefList {
    pub fn from_refs(refs: Vec<GitRef>, fetched_at: DateTime<Utc>) -> Self {
        let refs = refs
            .into_iter()
            .filter(|r| !r.name.is_empty())
            .map(|r| (ref_entry_name(&r.name), r))
            .collect();
        Self { fetched_at, refs }
    }

    /// The ref listed under directory name `entry`.
    pub fn get(&self, entry: &str) -> Option<&GitRef> {
        self.refs.get(entry)
    }

    /// Directory names and refs, ordered by directory name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GitRef)> {
        self.refs.iter().map(|(entry, r)| (entry.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

impl Fetched for RefList {
    fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Identifies a cached repository listing.
///
/// `git_ref` is what the tree was fetched at: the default branch's name for
/// [`Checkout::Default`], the commit a branch or tag pointed to otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoKey {
    pub owner: String,
    pub repo: String,
    pub checkout: Checkout,
    pub git_ref: String,
}

impl RepoKey {
    /// Key for the default branch `git_ref`.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        git_ref: impl Into<String>,
    ) -> Self {
        Self::at(owner, repo, Checkout::Default, git_ref)
    }

    pub fn at(
        owner: impl Into<String>,
        repo: impl Into<String>,
        checkout: Checkout,
        git_ref: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            checkout,
            git_ref: git_ref.into(),
        }
    }

}

/// Key of a [`LazyCache`].
pub trait CacheKey: Clone + Eq + Hash {
    /// Whether storing under `self` should evict the value under `other`.
    fn replaces(&self, _other: &Self) -> bool {
        false
    }
}

impl CacheKey for RepoKey {
    /// A checkout holds one tree: the one at the commit it was last read at.
    fn replaces(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.repo == other.repo
            && self.checkout == other.checkout
            && self.git_ref != other.git_ref
    }
}

/// Identifies a cached branch or tag list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefsKey {
    pub owner: String,
    pub repo: String,
    pub kind: RefKind,
}

impl CacheKey for RefsKey {}

impl RefsKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, kind: RefKind) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            kind,
        }
    }
}

/// Lazily fetched values that go stale with their repository.
///
/// A value is stale once the repository's `last_modified` is newer than the
/// value's `fetched_at`. Concurrent misses for the same key share one fetch.
#[derive(Debug)]
pub struct LazyCache<K, V> {
    entries: Mutex<HashMap<K, Arc<V>>>,
    inflight: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

/// Repository file trees, one per checkout.
pub type RepoFileCache = LazyCache<RepoKey, RepoFiles>;

/// Branch and tag lists, one per repository and kind.
pub type RefCache = LazyCache<RefsKey, RefList>;

impl<K, V> Default for LazyCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: CacheKey, V: Fetched> LazyCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value, unless the repository changed after it was fetched.
    pub fn get_fresh(&self, key: &K, last_modified: DateTime<Utc>) -> Option<Arc<V>> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|value| value.fetched_at() >= last_modified)
            .cloned()
    }

    pub fn insert(&self, key: K, value: Arc<V>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|existing, _| !key.replaces(existing));
            entries.insert(key, value);
        }
    }

    /// Drop values for which `keep` returns false.
    pub fn retain(&self, keep: impl Fn(&K) -> bool) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|key, _| keep(key));
        }
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.retain(|key, _| keep(key));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.lock().map(|i| i.len()).unwrap_or(0)
    }

    /// Return a fresh value, calling `fetch` on a miss.
    ///
    /// Failures are not cached; the next caller fetches again.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &K,
        last_modified: DateTime<Utc>,
        fetch: F,
    ) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get_fresh(key, last_modified) {
            return Ok(value);
        }

        let gate = match self.inflight.lock() {
            Ok(mut inflight) => Arc::clone(inflight.entry(key.clone()).or_default()),
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        };
        let result = {
            let _guard = gate.lock().await;

            // Another caller may have filled it while we waited.
            match self.get_fresh(key, last_modified) {
                Some(value) => Ok(value),
                None => fetch().await.map(|value| {
                    let value = Arc::new(value);
                    self.insert(key.clone(), Arc::clone(&value));
                    value
                }),
            }
        };

        // The last caller through removes the gate. Anyone still queued on it
        // holds a clone, so the count stays above two until they finish.
        if let Ok(mut inflight) = self.inflight.lock()
            && let Some(current) = inflight.get(key)
            && Arc::ptr_eq(current, &gate)
            && Arc::strong_count(&gate) <= 2
        {
            inflight.remove(key);
        }
        result
    }
}

/// Blob contents keyed by SHA.
///
/// Blobs are content-addressed so entries never go stale. Blobs over
/// [`MAX_CACHED_BLOB_BYTES`] are kept one at a time, enough for a
/// sequential read of a large file to fetch it once.
pub struct BlobCache {
    inner: Cache<String, Arc<[u8]>>,
    large: Mutex<Option<(String, Arc<[u8]>)>>,
}

impl BlobCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Cache::new(capacity.max(1)),
            large: Mutex::new(None),
        }
    }

    pub fn get(&self, sha: &str) -> Option<Arc<[u8]>> {
        if let Some(bytes) = self.inner.get(sha) {
            return Some(bytes);
        }
        let large = self.large.lock().ok()?;
        large
            .as_ref()
            .filter(|(key, _)| key == sha)
            .map(|(_, bytes)| Arc::clone(bytes))
    }

    pub fn insert(&self, sha: &str, bytes: Arc<[u8]>) {
        if bytes.len() <= MAX_CACHED_BLOB_BYTES {
            self.inner.insert(sha.to_string(), bytes);
        } else if let Ok(mut large) = self.large.lock() {
            *large = Some((sha.to_string(), bytes));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for BlobCache {
    fn default() -> Self {
        Self::new(DEFAULT_BLOB_CAPACITY)
    }
}

impl std::fmt::Debug for BlobCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobCache")
            .field("len", &self.inner.len())
            .field("capacity", &self.inner.capacity())
            .finish()
    }
}
