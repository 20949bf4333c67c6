//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gitfuse::catalog::{
    CatalogStore, Owner, ProgressCallback, RefreshOptions, RefreshProgress, RepositoryEntry,
    Visibility,
};
use gitfuse::fs::{FsOptions, GitHubFs, Ownership};
use gitfuse::github::GitHubError;
use gitfuse::retry::RetryConfig;
use gitfuse::source::{GitRef, RefKind, RepositorySource, TreeEntry};

/// Upper bound for anything that should finish promptly.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, d, 12, 0, 0).unwrap()
}

pub fn repo(owner: &str, name: &str, last_modified: DateTime<Utc>) -> RepositoryEntry {
    RepositoryEntry {
        owner: owner.to_string(),
        name: name.to_string(),
        default_branch: "main".to_string(),
        size_kb: 4,
        last_modified,
        created_at: day(1),
        visibility: Visibility::Public,
    }
}

/// In-memory [`RepositorySource`] with scripted responses.
#[derive(Default)]
pub struct FakeSource {
    repos: Mutex<HashMap<String, Result<Vec<RepositoryEntry>, GitHubError>>>,
    failures: Mutex<HashMap<String, VecDeque<GitHubError>>>,
    trees: Mutex<HashMap<String, Vec<TreeEntry>>>,
    refs: Mutex<HashMap<(String, RefKind), Vec<GitRef>>>,
    commit_times: Mutex<HashMap<String, DateTime<Utc>>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    tree_delay: Mutex<Option<Duration>>,
    pub list_calls: AtomicUsize,
    pub tree_calls: AtomicUsize,
    pub blob_calls: AtomicUsize,
    pub ref_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_repos(&self, owner: &str, repos: Vec<RepositoryEntry>) {
        self.repos
            .lock()
            .unwrap()
            .insert(owner.to_string(), Ok(repos));
    }

    pub fn fail_owner(&self, owner: &str, error: GitHubError) {
        self.repos
            .lock()
            .unwrap()
            .insert(owner.to_string(), Err(error));
    }

    /// Fail the next listing of `owner` with `error`, then answer normally.
    pub fn fail_once(&self, owner: &str, error: GitHubError) {
        self.failures
            .lock()
            .unwrap()
            .entry(owner.to_string())
            .or_default()
            .push_back(error);
    }

    /// Tree served at `git_ref` (a branch name or commit sha).
    pub fn set_tree_at(&self, owner: &str, repo: &str, git_ref: &str, entries: Vec<TreeEntry>) {
        self.trees
            .lock()
            .unwrap()
            .insert(format!("{}/{}@{}", owner, repo, git_ref), entries);
    }

    pub fn set_refs(&self, owner: &str, repo: &str, kind: RefKind, refs: &[(&str, &str)]) {
        let refs = refs
            .iter()
            .map(|(name, sha)| GitRef::new(*name, *sha))
            .collect();
        self.refs
            .lock()
            .unwrap()
            .insert((format!("{}/{}", owner, repo), kind), refs);
    }

    pub fn set_commit_time(&self, sha: &str, time: DateTime<Utc>) {
        self.commit_times
            .lock()
            .unwrap()
            .insert(sha.to_string(), time);
    }

    pub fn set_tree(&self, owner: &str, repo: &str, entries: Vec<TreeEntry>) {
        self.trees
            .lock()
            .unwrap()
            .insert(format!("{}/{}", owner, repo), entries);
    }

    pub fn set_blob(&self, sha: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(sha.to_string(), bytes.to_vec());
    }

    /// Make every file tree fetch take `delay` before answering.
    pub fn delay_trees(&self, delay: Option<Duration>) {
        *self.tree_delay.lock().unwrap() = delay;
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn tree_count(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }

    pub fn blob_count(&self) -> usize {
        self.blob_calls.load(Ordering::SeqCst)
    }

    pub fn ref_count(&self) -> usize {
        self.ref_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositorySource for FakeSource {
    async fn list_repositories(&self, owner: &Owner) -> Result<Vec<RepositoryEntry>, GitHubError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&owner.name)
            .and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }
        self.repos
            .lock()
            .unwrap()
            .get(&owner.name)
            .cloned()
            .unwrap_or_else(|| Err(GitHubError::not_found(owner.name.clone())))
    }

    async fn fetch_file_tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<Vec<TreeEntry>, GitHubError> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.tree_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let trees = self.trees.lock().unwrap();
        Ok(trees
            .get(&format!("{}/{}@{}", owner, repo, git_ref))
            .or_else(|| trees.get(&format!("{}/{}", owner, repo)))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_refs(
        &self,
        owner: &str,
        repo: &str,
        kind: RefKind,
    ) -> Result<Vec<GitRef>, GitHubError> {
        self.ref_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .refs
            .lock()
            .unwrap()
            .get(&(format!("{}/{}", owner, repo), kind))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_commit_time(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
    ) -> Result<DateTime<Utc>, GitHubError> {
        self.commit_times
            .lock()
            .unwrap()
            .get(sha)
            .copied()
            .ok_or_else(|| GitHubError::not_found(sha))
    }

    async fn fetch_blob(&self, _owner: &str, _repo: &str, sha: &str) -> Result<Vec<u8>, GitHubError> {
        self.blob_calls.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap()
            .get(sha)
            .cloned()
            .ok_or_else(|| GitHubError::not_found(sha))
    }
}

/// Refresh options that fail fast instead of backing off.
pub fn no_retry() -> RefreshOptions {
    RefreshOptions {
        concurrency: 2,
        retry: RetryConfig::none(),
    }
}

pub fn fs_options() -> FsOptions {
    FsOptions {
        fetch_timeout: Duration::from_secs(5),
        blob_capacity: 64,
        ownership: Ownership {
            uid: 1000,
            gid: 1000,
        },
    }
}

pub fn mount(store: &CatalogStore, source: &Arc<FakeSource>) -> GitHubFs {
    GitHubFs::new(store.clone(), source.clone(), fs_options())
}

/// A progress callback that records every event.
pub fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<RefreshProgress>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Box::new(move |event| {
        sink.lock().unwrap().push(event);
    });
    (callback, events)
}
