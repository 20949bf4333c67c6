//! Refresh ticks and the background scheduler.
//!
//! A tick fetches every owner's repository list concurrently, merges the
//! results with the previous snapshot and publishes the merge in one swap.
//! Owners whose fetch failed keep their previous entries.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc, watch};

use super::progress::{ProgressCallback, RefreshProgress, emit};
use super::store::CatalogStore;
use super::types::{
    CatalogSnapshot, DEFAULT_CONCURRENCY, OwnerCatalog, OwnerEvent, OwnerState, RepositoryEntry,
};
use crate::etag_cache::EtagCache;
use crate::github::{GitHubError, is_retryable_error, short_error_message};
use crate::retry::{RetryConfig, with_retry};
use crate::source::RepositorySource;

/// Errors that end a refresh tick without publishing.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// GitHub rejected the token. Fatal for the whole process.
    #[error("GitHub rejected the token while refreshing {owner}")]
    Auth { owner: String },

    /// Shutdown was requested during the tick.
    #[error("Refresh cancelled by shutdown")]
    Cancelled,
}

/// Options for a single refresh tick.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Maximum owners fetched at once.
    pub concurrency: usize,
    /// Backoff for retryable errors within the tick.
    pub retry: RetryConfig,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryConfig::default(),
        }
    }
}

/// Options for the background scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Interval between the end of one tick and the start of the next.
    pub update_rate: Duration,
    pub refresh: RefreshOptions,
    /// Saved after every tick that published a snapshot.
    pub etag_cache: Option<EtagCache>,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    /// The snapshot published by this tick, if any owner succeeded.
    pub published: Option<Arc<CatalogSnapshot>>,
    pub succeeded: usize,
    pub failed: usize,
    /// Longest wait GitHub asked for among rate-limited owners.
    pub retry_after: Option<Duration>,
    /// `owner: message` for each failed owner.
    pub errors: Vec<String>,
}

enum OwnerFetch {
    Done(Vec<RepositoryEntry>),
    Failed(GitHubError),
    Skipped,
}

fn advance(owner: &str, state: OwnerState, event: OwnerEvent) -> OwnerState {
    match state.transition(event) {
        Ok(next) => next,
        Err(e) => {
            tracing::warn!(owner = %owner, "{}", e);
            state
        }
    }
}

/// Run one refresh tick against the store's current snapshot.
///
/// Owners are fetched with at most `options.concurrency` requests in flight.
/// Once `shutdown` turns true, owners not yet started are skipped, in-flight
/// fetches finish, and the tick returns [`RefreshError::Cancelled`] without
/// publishing. If no owner succeeds the previous snapshot stays published.
#[tracing::instrument(skip_all, fields(concurrency = options.concurrency))]
pub async fn refresh_catalog<S>(
    source: &Arc<S>,
    store: &CatalogStore,
    options: &RefreshOptions,
    shutdown: &watch::Receiver<bool>,
    on_progress: Option<&ProgressCallback>,
) -> Result<RefreshOutcome, RefreshError>
where
    S: RepositorySource + ?Sized,
{
    let previous = store.current();

    emit(
        on_progress,
        RefreshProgress::TickStarted {
            version: previous.version,
            owners: previous.owners.len(),
        },
    );

    let concurrency = options.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(previous.owners.len());
    let (backoff_tx, mut backoff_rx) = mpsc::unbounded_channel::<RefreshProgress>();

    for catalog in previous.owners.values() {
        let source = Arc::clone(source);
        let semaphore = Arc::clone(&semaphore);
        let shutdown = shutdown.clone();
        let owner = catalog.owner.clone();
        let retry = options.retry.clone();
        let backoff_tx = backoff_tx.clone();

        let handle = tokio::spawn(async move {
            let report_backoff: ProgressCallback = Box::new(move |event| {
                let _ = backoff_tx.send(event);
            });

            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        owner.name.clone(),
                        OwnerFetch::Failed(GitHubError::transient("Semaphore closed unexpectedly")),
                    );
                }
            };

            if *shutdown.borrow() {
                return (owner.name.clone(), OwnerFetch::Skipped);
            }

            let result = with_retry(
                || async { source.list_repositories(&owner).await },
                is_retryable_error,
                GitHubError::retry_after,
                |e: &GitHubError| short_error_message(e),
                &owner.name,
                &retry,
                Some(&report_backoff),
            )
            .await;

            let fetch = match result {
                Ok(repos) => OwnerFetch::Done(repos),
                Err(e) => OwnerFetch::Failed(e),
            };
            (owner.name.clone(), fetch)
        });

        handles.push(handle);
    }

    // Every task owns a sender, so this drains until the last owner is done.
    drop(backoff_tx);
    while let Some(event) = backoff_rx.recv().await {
        emit(on_progress, event);
    }

    let mut results: HashMap<String, OwnerFetch> = HashMap::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok((name, fetch)) => {
                results.insert(name, fetch);
            }
            Err(e) => {
                tracing::error!("Owner refresh task panicked: {}", e);
            }
        }
    }

    let mut outcome = RefreshOutcome::default();
    let mut auth_failure: Option<String> = None;
    let mut next: BTreeMap<String, OwnerCatalog> = BTreeMap::new();
    let fetched_at = Utc::now();

    for (name, prev) in &previous.owners {
        let state = advance(name, prev.state, OwnerEvent::TickStarted);
        let mut catalog = prev.clone();

        match results.remove(name) {
            Some(OwnerFetch::Done(mut repos)) => {
                // Lookups binary-search by name.
                repos.sort_by(|a, b| a.name.cmp(&b.name));
                // Logins are case-insensitive; paths use the configured spelling.
                for repo in &mut repos {
                    if repo.owner != *name {
                        repo.owner.clone_from(name);
                    }
                }
                let state = advance(name, state, OwnerEvent::FetchStarted);
                catalog.state = advance(name, state, OwnerEvent::FetchSucceeded);
                emit(
                    on_progress,
                    RefreshProgress::OwnerRefreshed {
                        owner: name.clone(),
                        repos: repos.len(),
                    },
                );
                catalog.repositories = Arc::from(repos);
                catalog.refreshed_at = Some(fetched_at);
                catalog.last_error = None;
                outcome.succeeded += 1;
            }
            Some(OwnerFetch::Failed(err)) => {
                let state = advance(name, state, OwnerEvent::FetchStarted);
                catalog.state = advance(name, state, OwnerEvent::FetchFailed);
                let message = short_error_message(&err);
                tracing::warn!(owner = %name, "Refresh failed, keeping previous entries: {}", message);
                emit(
                    on_progress,
                    RefreshProgress::OwnerFailed {
                        owner: name.clone(),
                        error: message.clone(),
                    },
                );
                if err.is_fatal() && auth_failure.is_none() {
                    auth_failure = Some(name.clone());
                }
                if let Some(wait) = err.retry_after() {
                    outcome.retry_after = Some(outcome.retry_after.map_or(wait, |w| w.max(wait)));
                }
                outcome.errors.push(format!("{}: {}", name, message));
                catalog.last_error = Some(message);
                outcome.failed += 1;
            }
            Some(OwnerFetch::Skipped) => {
                emit(
                    on_progress,
                    RefreshProgress::OwnerSkipped {
                        owner: name.clone(),
                    },
                );
                catalog.state = state;
            }
            None => {
                // The task panicked; treat like a failed fetch.
                catalog.state = state;
                outcome.failed += 1;
            }
        }

        next.insert(name.clone(), catalog);
    }

    if let Some(owner) = auth_failure {
        return Err(RefreshError::Auth { owner });
    }

    if *shutdown.borrow() {
        tracing::info!("Shutdown requested, discarding refresh results");
        return Err(RefreshError::Cancelled);
    }

    if outcome.succeeded == 0 {
        tracing::warn!(
            failed = outcome.failed,
            "No owner refreshed successfully, keeping previous snapshot"
        );
        emit(
            on_progress,
            RefreshProgress::SnapshotUnchanged {
                failed: outcome.failed,
            },
        );
        return Ok(outcome);
    }

    let published = store.publish(next, fetched_at);
    tracing::info!(
        version = published.version,
        repos = published.repository_count(),
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "Published catalog snapshot"
    );
    emit(
        on_progress,
        RefreshProgress::SnapshotPublished {
            version: published.version,
            repos: published.repository_count(),
            succeeded: outcome.succeeded,
            failed: outcome.failed,
        },
    );
    outcome.published = Some(published);

    Ok(outcome)
}

/// Delay before the next tick: the update rate, or longer if GitHub asked.
pub fn next_delay(update_rate: Duration, retry_after: Option<Duration>) -> Duration {
    retry_after.map_or(update_rate, |wait| update_rate.max(wait))
}

/// Refresh the catalog until shutdown.
///
/// The first tick runs immediately. Returns `Ok(())` on shutdown and an error
/// only when GitHub rejects the token.
pub async fn run_scheduler<S>(
    source: Arc<S>,
    store: CatalogStore,
    options: SchedulerOptions,
    mut shutdown: watch::Receiver<bool>,
    on_progress: Option<ProgressCallback>,
) -> Result<(), RefreshError>
where
    S: RepositorySource + ?Sized,
{
    let on_progress = on_progress.as_ref();

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let delay = match refresh_catalog(&source, &store, &options.refresh, &shutdown, on_progress)
            .await
        {
            Ok(outcome) => {
                if outcome.published.is_some()
                    && let Some(cache) = &options.etag_cache
                    && let Err(e) = cache.save()
                {
                    tracing::warn!("Failed to save ETag cache: {}", e);
                }
                next_delay(options.update_rate, outcome.retry_after)
            }
            Err(RefreshError::Cancelled) => return Ok(()),
            Err(e) => return Err(e),
        };

        emit(on_progress, RefreshProgress::NextTick { delay });

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender dropped: nobody can ask us to stop anymore, so stop now.
                    return Ok(());
                }
            }
        }
    }
}
