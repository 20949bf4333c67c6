//! gitfuse - GitHub repositories as a read-only filesystem.
//!
//! The configured users' and organizations' repositories are listed through
//! the GitHub REST API and exposed as `/<owner>/<repo>/...`. Repository
//! listings are refreshed in the background; file trees and contents are
//! fetched the first time they are accessed.
//!
//! # Features
//!
//! - `fuse` - Mounting through the kernel FUSE interface (Linux only). Without
//!   it, [`fs::GitHubFs`] can still be driven directly.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitfuse::catalog::{CatalogStore, Owner, SchedulerOptions, run_scheduler};
//! use gitfuse::fs::{FsOptions, GitHubFs};
//! use gitfuse::github::{GitHubClient, GitHubToken, DEFAULT_API_URL, DEFAULT_HTTP_TIMEOUT};
//!
//! let client = Arc::new(GitHubClient::new(token, DEFAULT_API_URL, DEFAULT_HTTP_TIMEOUT)?);
//! let store = CatalogStore::new(&[Owner::user("alice")]);
//! tokio::spawn(run_scheduler(client.clone(), store.clone(), options, stop_rx, None));
//!
//! let fs = GitHubFs::new(store, client, FsOptions::default());
//! let names = fs.readdir(gitfuse::tree::NodeId::ROOT).await?;
//! ```

pub mod catalog;
pub mod config;
pub mod etag_cache;
pub mod fs;
pub mod github;
pub mod http;
pub mod rate_limit;
pub mod retry;
pub mod source;
pub mod tree;

pub use catalog::{CatalogSnapshot, CatalogStore, Owner, OwnerKind, RepositoryEntry};
pub use config::{ConfigError, RawSettings, Settings};
pub use etag_cache::EtagCache;
pub use fs::{FsError, GitHubFs};
pub use github::{GitHubClient, GitHubError, GitHubToken};
pub use rate_limit::ApiRateLimiter;
pub use source::{RepositorySource, TreeEntry, TreeEntryKind};
