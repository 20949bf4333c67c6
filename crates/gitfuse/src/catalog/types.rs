//! Core catalog types: owners, repositories and published snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of owners fetched concurrently during a refresh tick.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Maximum backoff delay in milliseconds when rate limited.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum retries for a single owner fetch within one tick.
pub const MAX_FETCH_RETRIES: u32 = 5;

/// Whether an owner is a user account or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    Organization,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::User => write!(f, "user"),
            OwnerKind::Organization => write!(f, "org"),
        }
    }
}

/// A configured GitHub account whose repositories are mounted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub kind: OwnerKind,
}

impl Owner {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OwnerKind::User,
        }
    }

    pub fn organization(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OwnerKind::Organization,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Repository visibility as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Internal,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
            Visibility::Internal => write!(f, "internal"),
        }
    }
}

/// A repository as it appears in the catalog.
///
/// Entries are immutable once fetched. A refresh replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Name of the owning user or organization.
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    /// Approximate size in KiB, as reported by GitHub.
    pub size_kb: u64,
    /// Newest of the push and metadata update timestamps.
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub visibility: Visibility,
}

impl RepositoryEntry {
    /// Get the full name (owner/name).
    #[inline]
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Approximate size in bytes.
    #[inline]
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_kb.saturating_mul(1024)
    }
}

/// Refresh lifecycle of one owner.
///
/// ```text
/// Pending -> Refreshing -> Fresh -> Stale -> Refreshing -> Fresh
///                       \-> RefreshFailed -> Refreshing -> ...
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerState {
    /// Never fetched successfully.
    Pending,
    /// Entries come from the latest tick.
    Fresh,
    /// A new tick started and this owner has not been fetched yet.
    Stale,
    /// A fetch for this owner is in flight.
    Refreshing,
    /// The latest fetch failed; entries are from an earlier tick (or empty).
    RefreshFailed,
}

/// Events driving [`OwnerState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerEvent {
    TickStarted,
    FetchStarted,
    FetchSucceeded,
    FetchFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid owner state transition: {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub from: OwnerState,
    pub event: OwnerEvent,
}

impl OwnerState {
    /// Apply an event, returning the next state.
    pub fn transition(self, event: OwnerEvent) -> Result<OwnerState, InvalidTransition> {
        use OwnerEvent::*;
        use OwnerState::*;

        match (self, event) {
            (Fresh, TickStarted) => Ok(Stale),
            (Pending | Stale | RefreshFailed, TickStarted) => Ok(self),
            (Pending | Stale | RefreshFailed, FetchStarted) => Ok(Refreshing),
            (Refreshing, FetchSucceeded) => Ok(Fresh),
            (Refreshing, FetchFailed) => Ok(RefreshFailed),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Short label for display.
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerState::Pending => "pending",
            OwnerState::Fresh => "fresh",
            OwnerState::Stale => "stale",
            OwnerState::Refreshing => "refreshing",
            OwnerState::RefreshFailed => "refresh_failed",
        }
    }
}

impl fmt::Display for OwnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One owner's slice of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerCatalog {
    pub owner: Owner,
    pub state: OwnerState,
    /// Repositories ordered by name.
    pub repositories: Arc<[RepositoryEntry]>,
    /// When the entries were last fetched successfully.
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Message of the latest failure, cleared on success.
    pub last_error: Option<String>,
}

impl OwnerCatalog {
    /// A placeholder for an owner that was never fetched.
    pub fn pending(owner: Owner) -> Self {
        Self {
            owner,
            state: OwnerState::Pending,
            repositories: Arc::from(Vec::new()),
            refreshed_at: None,
            last_error: None,
        }
    }

    /// Look up a repository by name.
    pub fn repository(&self, name: &str) -> Option<&RepositoryEntry> {
        self.repositories
            .binary_search_by(|r| r.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.repositories[i])
    }

    /// Newest repository timestamp, if any.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.repositories.iter().map(|r| r.last_modified).max()
    }
}

/// An immutable, published view of every owner's repositories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// Strictly increasing across publications.
    pub version: u64,
    /// When the data in this snapshot was fetched. Never goes backwards.
    pub fetched_at: Option<DateTime<Utc>>,
    pub owners: BTreeMap<String, OwnerCatalog>,
}

impl CatalogSnapshot {
    /// The initial snapshot: every configured owner, nothing fetched.
    pub fn initial(owners: &[Owner]) -> Self {
        Self {
            version: 0,
            fetched_at: None,
            owners: owners
                .iter()
                .map(|o| (o.name.clone(), OwnerCatalog::pending(o.clone())))
                .collect(),
        }
    }

    pub fn owner(&self, name: &str) -> Option<&OwnerCatalog> {
        self.owners.get(name)
    }

    pub fn repository(&self, owner: &str, name: &str) -> Option<&RepositoryEntry> {
        self.owners.get(owner).and_then(|o| o.repository(name))
    }

    /// Total number of repositories across all owners.
    pub fn repository_count(&self) -> usize {
        self.owners.values().map(|o| o.repositories.len()).sum()
    }
}
