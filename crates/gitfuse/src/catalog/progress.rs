//! Progress reporting for catalog refreshes.

use std::time::Duration;

/// Progress events emitted while refreshing the catalog.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RefreshProgress {
    /// A refresh tick started.
    TickStarted {
        /// Version of the snapshot being refreshed.
        version: u64,
        /// Number of owners to fetch.
        owners: usize,
    },

    /// An owner's repositories were fetched.
    OwnerRefreshed {
        owner: String,
        /// Number of repositories listed.
        repos: usize,
    },

    /// An owner's fetch failed; its previous entries are kept.
    OwnerFailed { owner: String, error: String },

    /// An owner was skipped because shutdown was requested.
    OwnerSkipped { owner: String },

    /// Backing off before retrying a request.
    RetryBackoff {
        /// What is being retried (usually an owner name).
        resource: String,
        /// Delay before the next attempt.
        retry_after_ms: u64,
        /// Attempt number that just failed (1-indexed).
        attempt: u32,
    },

    /// A new snapshot was published.
    SnapshotPublished {
        version: u64,
        /// Total repositories across all owners.
        repos: usize,
        succeeded: usize,
        failed: usize,
    },

    /// No owner succeeded; the previous snapshot stays published.
    SnapshotUnchanged { failed: usize },

    /// The scheduler is sleeping until the next tick.
    NextTick { delay: Duration },
}

/// Type alias for progress callback functions.
pub type ProgressCallback = Box<dyn Fn(RefreshProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: RefreshProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
