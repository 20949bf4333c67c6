//! Integration tests for refresh ticks and the background scheduler.
//!
//! Key scenarios tested:
//! - One owner failing keeps its previous entries while others update
//! - A tick where every owner fails publishes nothing
//! - An authentication failure stops the scheduler
//! - Shutdown cancels a tick and stops the loop
//! - Versions and fetch timestamps only move forward
//! - Rate-limit waits stretch the delay before the next tick
//! - Retries inside a tick are reported as backoff progress
//! - Entries carry the configured owner spelling, not GitHub's login

mod common;

use std::time::Duration;

use common::{FakeSource, TEST_TIMEOUT, day, no_retry, recorder, repo};
use gitfuse::catalog::{
    CatalogStore, Owner, OwnerState, RefreshError, RefreshOptions, RefreshProgress,
    SchedulerOptions, refresh_catalog, run_scheduler,
};
use gitfuse::github::GitHubError;
use gitfuse::retry::RetryConfig;
use tokio::sync::watch;

fn owners() -> Vec<Owner> {
    vec![Owner::user("alice"), Owner::organization("acme")]
}

#[tokio::test]
async fn test_first_tick_publishes_all_owners() {
    let source = FakeSource::new();
    source.set_repos("alice", vec![repo("alice", "demo", day(2))]);
    source.set_repos("acme", vec![repo("acme", "api", day(3)), repo("acme", "web", day(4))]);

    let store = CatalogStore::new(&owners());
    let (_stop_tx, stop_rx) = watch::channel(false);

    let outcome = refresh_catalog(&source, &store, &no_retry(), &stop_rx, None)
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 0);
    let snap = store.current();
    assert_eq!(snap.version, 1);
    assert_eq!(snap.repository_count(), 3);
    assert_eq!(snap.owner("alice").unwrap().state, OwnerState::Fresh);
    assert!(snap.repository("acme", "web").is_some());
}

#[tokio::test]
async fn test_failed_owner_keeps_previous_entries() {
    let source = FakeSource::new();
    source.set_repos("alice", vec![repo("alice", "demo", day(2))]);
    source.set_repos("acme", vec![repo("acme", "api", day(3))]);

    let store = CatalogStore::new(&owners());
    let (_stop_tx, stop_rx) = watch::channel(false);
    refresh_catalog(&source, &store, &no_retry(), &stop_rx, None)
        .await
        .unwrap();
    let before = store.current();

    source.fail_owner("alice", GitHubError::transient("connection reset"));
    source.set_repos("acme", vec![repo("acme", "api", day(3)), repo("acme", "cli", day(5))]);

    let outcome = refresh_catalog(&source, &store, &no_retry(), &stop_rx, None)
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 1);

    let after = store.current();
    assert_eq!(after.version, 2);

    let alice = after.owner("alice").unwrap();
    assert_eq!(alice.state, OwnerState::RefreshFailed);
    assert_eq!(
        alice.repositories,
        before.owner("alice").unwrap().repositories
    );
    assert!(alice.last_error.is_some());

    let acme = after.owner("acme").unwrap();
    assert_eq!(acme.state, OwnerState::Fresh);
    assert_eq!(acme.repositories.len(), 2);
}

#[tokio::test]
async fn test_all_owners_failing_publishes_nothing() {
    let source = FakeSource::new();
    source.fail_owner("alice", GitHubError::transient("timeout"));
    source.fail_owner("acme", GitHubError::not_found("acme"));

    let store = CatalogStore::new(&owners());
    let (_stop_tx, stop_rx) = watch::channel(false);
    let (callback, events) = recorder();

    let outcome = refresh_catalog(&source, &store, &no_retry(), &stop_rx, Some(&callback))
        .await
        .unwrap();

    assert!(outcome.published.is_none());
    assert_eq!(outcome.failed, 2);
    assert_eq!(store.current().version, 0);
    assert!(
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, RefreshProgress::SnapshotUnchanged { failed: 2 }))
    );
}

#[tokio::test]
async fn test_auth_failure_is_fatal() {
    let source = FakeSource::new();
    source.set_repos("alice", vec![repo("alice", "demo", day(2))]);
    source.fail_owner("acme", GitHubError::Auth);

    let store = CatalogStore::new(&owners());
    let (_stop_tx, stop_rx) = watch::channel(false);

    let result = refresh_catalog(&source, &store, &no_retry(), &stop_rx, None).await;
    assert!(matches!(result, Err(RefreshError::Auth { owner }) if owner == "acme"));
    assert_eq!(store.current().version, 0);

    let options = SchedulerOptions {
        update_rate: Duration::from_secs(30),
        refresh: no_retry(),
        etag_cache: None,
    };
    let result = tokio::time::timeout(
        TEST_TIMEOUT,
        run_scheduler(source.clone(), store.clone(), options, stop_rx, None),
    )
    .await
    .expect("scheduler should stop on auth failure");
    assert!(matches!(result, Err(RefreshError::Auth { .. })));
}

#[tokio::test]
async fn test_shutdown_cancels_tick() {
    let source = FakeSource::new();
    source.set_repos("alice", vec![repo("alice", "demo", day(2))]);
    source.set_repos("acme", Vec::new());

    let store = CatalogStore::new(&owners());
    let (stop_tx, stop_rx) = watch::channel(false);
    stop_tx.send(true).unwrap();

    let result = refresh_catalog(&source, &store, &no_retry(), &stop_rx, None).await;
    assert!(matches!(result, Err(RefreshError::Cancelled)));
    assert_eq!(store.current().version, 0);
    // Owners not yet started are skipped entirely.
    assert_eq!(source.list_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_ticks_at_update_rate_and_stops() {
    let source = FakeSource::new();
    source.set_repos("alice", vec![repo("alice", "demo", day(2))]);
    source.set_repos("acme", Vec::new());

    let store = CatalogStore::new(&owners());
    let mut updates = store.subscribe();
    let (stop_tx, stop_rx) = watch::channel(false);

    let options = SchedulerOptions {
        update_rate: Duration::from_secs(30),
        refresh: no_retry(),
        etag_cache: None,
    };
    let handle = tokio::spawn(run_scheduler(
        source.clone(),
        store.clone(),
        options,
        stop_rx,
        None,
    ));

    updates.changed().await.unwrap();
    let first = tokio::time::Instant::now();
    assert_eq!(updates.borrow_and_update().version, 1);

    updates.changed().await.unwrap();
    assert_eq!(updates.borrow_and_update().version, 2);
    assert!(first.elapsed() >= Duration::from_secs(30));

    stop_tx.send(true).unwrap();
    let result = tokio::time::timeout(TEST_TIMEOUT, handle)
        .await
        .expect("scheduler should stop promptly")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_never_go_backwards() {
    let source = FakeSource::new();
    source.set_repos("alice", vec![repo("alice", "demo", day(2))]);
    source.set_repos("acme", Vec::new());

    let store = CatalogStore::new(&owners());
    let mut updates = store.subscribe();
    let (stop_tx, stop_rx) = watch::channel(false);

    let options = SchedulerOptions {
        update_rate: Duration::from_secs(1),
        refresh: no_retry(),
        etag_cache: None,
    };
    let handle = tokio::spawn(run_scheduler(
        source.clone(),
        store.clone(),
        options,
        stop_rx,
        None,
    ));

    let mut last_version = 0;
    let mut last_fetched = None;
    for i in 0..5 {
        if i == 2 {
            // A failing tick in the middle must not disturb ordering.
            source.fail_owner("alice", GitHubError::transient("flaky"));
        }
        updates.changed().await.unwrap();
        let snap = updates.borrow_and_update().clone();
        assert!(snap.version > last_version);
        assert!(snap.fetched_at >= last_fetched);
        last_version = snap.version;
        last_fetched = snap.fetched_at;
    }

    stop_tx.send(true).unwrap();
    tokio::time::timeout(TEST_TIMEOUT, handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_stretches_next_delay() {
    let source = FakeSource::new();
    source.set_repos("alice", vec![repo("alice", "demo", day(2))]);
    source.fail_owner(
        "acme",
        GitHubError::RateLimited {
            retry_after: Duration::from_secs(120),
        },
    );

    let store = CatalogStore::new(&owners());
    let mut updates = store.subscribe();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (callback, events) = recorder();

    let options = SchedulerOptions {
        update_rate: Duration::from_secs(30),
        refresh: no_retry(),
        etag_cache: None,
    };
    let handle = tokio::spawn(run_scheduler(
        source.clone(),
        store.clone(),
        options,
        stop_rx,
        Some(callback),
    ));

    updates.changed().await.unwrap();
    let first = tokio::time::Instant::now();
    updates.changed().await.unwrap();
    assert!(first.elapsed() >= Duration::from_secs(120));

    stop_tx.send(true).unwrap();
    tokio::time::timeout(TEST_TIMEOUT, handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let delays: Vec<Duration> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            RefreshProgress::NextTick { delay } => Some(*delay),
            _ => None,
        })
        .collect();
    assert_eq!(delays.first(), Some(&Duration::from_secs(120)));
}

#[tokio::test(start_paused = true)]
async fn test_retries_within_tick_are_reported() {
    let source = FakeSource::new();
    source.set_repos("alice", vec![repo("alice", "demo", day(2))]);
    source.set_repos("acme", vec![repo("acme", "api", day(3))]);
    source.fail_once("alice", GitHubError::transient("connection reset"));

    let store = CatalogStore::new(&owners());
    let (_stop_tx, stop_rx) = watch::channel(false);
    let (callback, events) = recorder();
    let options = RefreshOptions {
        concurrency: 2,
        retry: RetryConfig::new(Duration::from_millis(10), Duration::from_millis(20), 2),
    };

    let outcome = refresh_catalog(&source, &store, &options, &stop_rx, Some(&callback))
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(source.list_count(), 3);

    let events = events.lock().unwrap();
    let backoffs: Vec<(&str, u32)> = events
        .iter()
        .filter_map(|e| match e {
            RefreshProgress::RetryBackoff {
                resource, attempt, ..
            } => Some((resource.as_str(), *attempt)),
            _ => None,
        })
        .collect();
    assert_eq!(backoffs, vec![("alice", 1)]);

    let backoff_at = events
        .iter()
        .position(|e| matches!(e, RefreshProgress::RetryBackoff { .. }))
        .unwrap();
    let refreshed_at = events
        .iter()
        .position(|e| matches!(e, RefreshProgress::OwnerRefreshed { owner, .. } if owner == "alice"))
        .unwrap();
    assert!(backoff_at < refreshed_at);
}

#[tokio::test]
async fn test_entries_use_configured_owner_spelling() {
    let source = FakeSource::new();
    // GitHub answers with its canonical login.
    source.set_repos("Alice", vec![repo("alice", "demo", day(2))]);

    let store = CatalogStore::new(&[Owner::user("Alice")]);
    let (_stop_tx, stop_rx) = watch::channel(false);
    refresh_catalog(&source, &store, &no_retry(), &stop_rx, None)
        .await
        .unwrap();

    let snap = store.current();
    let demo = snap.repository("Alice", "demo").unwrap();
    assert_eq!(demo.owner, "Alice");
}
