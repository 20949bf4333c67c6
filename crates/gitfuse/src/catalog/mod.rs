//! The repository catalog and its refresh scheduler.
//!
//! # Module Structure
//!
//! - [`types`] - Owners, repository entries, owner state machine, snapshots
//! - [`store`] - The atomically replaced published snapshot
//! - [`refresh`] - Refresh ticks and the background scheduler loop
//! - [`progress`] - Progress events: `RefreshProgress`, `ProgressCallback`, `emit()`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitfuse::catalog::{CatalogStore, Owner, SchedulerOptions, run_scheduler};
//!
//! let owners = vec![Owner::user("alice")];
//! let store = CatalogStore::new(&owners);
//! let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(run_scheduler(Arc::new(client), store.clone(), options, stop_rx, None));
//! ```

mod progress;
mod refresh;
mod store;
mod types;

pub use progress::{ProgressCallback, RefreshProgress, emit};
pub use refresh::{
    RefreshError, RefreshOptions, RefreshOutcome, SchedulerOptions, next_delay, refresh_catalog,
    run_scheduler,
};
pub use store::CatalogStore;
pub use types::{
    CatalogSnapshot, DEFAULT_CONCURRENCY, INITIAL_BACKOFF_MS, InvalidTransition, MAX_BACKOFF_MS,
    MAX_FETCH_RETRIES, Owner, OwnerCatalog, OwnerEvent, OwnerKind, OwnerState, RepositoryEntry,
    Visibility,
};
