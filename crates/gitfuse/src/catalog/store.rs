//! The published catalog snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::types::{CatalogSnapshot, Owner, OwnerCatalog};

/// Holds the currently published [`CatalogSnapshot`].
///
/// Readers clone an `Arc` of the current snapshot and keep using it for as
/// long as they like; a refresh swaps in a new one without touching it.
/// Versions strictly increase and `fetched_at` never goes backwards.
#[derive(Clone)]
pub struct CatalogStore {
    tx: Arc<watch::Sender<Arc<CatalogSnapshot>>>,
}

impl CatalogStore {
    /// Create a store whose initial snapshot lists `owners` as pending.
    pub fn new(owners: &[Owner]) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(CatalogSnapshot::initial(owners)));
        Self { tx: Arc::new(tx) }
    }

    /// The currently published snapshot.
    pub fn current(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receive a notification each time a snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
        self.tx.subscribe()
    }

    /// Publish a new snapshot built from `owners`.
    ///
    /// The version is assigned here, one past the current one. A `fetched_at`
    /// older than the current snapshot's is clamped forward.
    pub fn publish(
        &self,
        owners: BTreeMap<String, OwnerCatalog>,
        fetched_at: DateTime<Utc>,
    ) -> Arc<CatalogSnapshot> {
        let mut published = None;
        self.tx.send_modify(|current| {
            let fetched_at = match current.fetched_at {
                Some(prev) if prev > fetched_at => prev,
                _ => fetched_at,
            };
            let next = Arc::new(CatalogSnapshot {
                version: current.version + 1,
                fetched_at: Some(fetched_at),
                owners,
            });
            published = Some(Arc::clone(&next));
            *current = next;
        });

        // send_modify always runs the closure.
        published.unwrap_or_else(|| self.current())
    }
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current();
        f.debug_struct("CatalogStore")
            .field("version", &current.version)
            .field("owners", &current.owners.len())
            .finish()
    }
}
