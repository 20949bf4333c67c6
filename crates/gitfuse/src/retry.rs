//! Backoff around GitHub listing calls.
//!
//! Only owner listings go through here. Lazy tree and blob fetches run under
//! the filesystem's own timeout and fail fast with `EIO` instead.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::catalog::{
    INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_FETCH_RETRIES, ProgressCallback, RefreshProgress,
};

/// How hard a refresh tick tries before giving up on an owner.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// First backoff delay.
    pub min_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Retries after the first attempt; zero means one attempt only.
    pub max_retries: usize,
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_FETCH_RETRIES as usize,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// A single attempt with no backoff. Used by tests and one-shot commands.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0).with_jitter(false)
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Run `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the retry budget in `config` runs out.
///
/// When `retry_after` yields a server-requested wait, the next attempt waits
/// at least that long. A wait beyond `config.max_delay` ends the retries and
/// returns the error, leaving the wait to the caller.
///
/// Every backoff is logged at debug level against `resource` (usually the
/// owner name) and reported as [`RefreshProgress::RetryBackoff`].
pub async fn with_retry<T, E, F, Fut, IsRetryable, RetryAfter, ShortMsg>(
    mut operation: F,
    is_retryable: IsRetryable,
    retry_after: RetryAfter,
    short_message: ShortMsg,
    resource: &str,
    config: &RetryConfig,
    on_progress: Option<&ProgressCallback>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    IsRetryable: Fn(&E) -> bool + Send + Sync + 'static,
    RetryAfter: Fn(&E) -> Option<Duration>,
    ShortMsg: Fn(&E) -> String + Send + Sync + 'static,
{
    let attempts = AtomicU32::new(0);

    let counted = || {
        attempts.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    counted
        .retry(config.clone().into_backoff())
        .when(is_retryable)
        .adjust(|err, delay| {
            let delay = delay?;
            match retry_after(err) {
                Some(wait) if wait > config.max_delay => {
                    tracing::debug!(
                        resource,
                        wait_secs = wait.as_secs(),
                        "Server asked for a longer wait than the backoff allows, giving up"
                    );
                    None
                }
                Some(wait) => Some(wait.max(delay)),
                None => Some(delay),
            }
        })
        .notify(|err, delay| {
            let attempt = attempts.load(Ordering::SeqCst);
            tracing::debug!(
                resource,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off: {}",
                short_message(err)
            );
            if let Some(cb) = on_progress {
                cb(RefreshProgress::RetryBackoff {
                    resource: resource.to_string(),
                    retry_after_ms: delay.as_millis() as u64,
                    attempt,
                });
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug)]
    struct ListingError {
        status: u16,
    }

    impl std::fmt::Display for ListingError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "listing failed with HTTP {}", self.status)
        }
    }

    impl std::error::Error for ListingError {}

    fn server_error(e: &ListingError) -> bool {
        e.status >= 500
    }

    fn throttled_or_server_error(e: &ListingError) -> bool {
        e.status == 429 || e.status >= 500
    }

    /// 429s ask for `secs`; everything else leaves the backoff alone.
    fn throttle_for(secs: u64) -> impl Fn(&ListingError) -> Option<Duration> {
        move |e| (e.status == 429).then(|| Duration::from_secs(secs))
    }

    /// Yields the statuses in order, then succeeds with the call count.
    fn scripted(
        statuses: &'static [u16],
        calls: &Arc<AtomicU32>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, ListingError>> + Send>>
    {
        let calls = Arc::clone(calls);
        move || {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
                match statuses.get(n) {
                    Some(&status) => Err(ListingError { status }),
                    None => Ok(n as u32 + 1),
                }
            })
        }
    }

    #[test]
    fn default_config_matches_refresh_constants() {
        let config = RetryConfig::default();
        assert_eq!(config.min_delay, Duration::from_millis(INITIAL_BACKOFF_MS));
        assert_eq!(config.max_delay, Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(config.max_retries, MAX_FETCH_RETRIES as usize);
        assert!(config.with_jitter);
    }

    #[test]
    fn none_allows_a_single_attempt() {
        let config = RetryConfig::none();
        assert_eq!(config.max_retries, 0);
        assert!(!config.with_jitter);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried_and_reported() {
        let calls = Arc::new(AtomicU32::new(0));
        let events: Arc<Mutex<Vec<RefreshProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        });

        let result = with_retry(
            scripted(&[502, 503], &calls),
            server_error,
            |_: &ListingError| None,
            |e: &ListingError| e.to_string(),
            "acme",
            &RetryConfig::default(),
            Some(&callback),
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        let attempts: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                RefreshProgress::RetryBackoff {
                    resource, attempt, ..
                } if resource == "acme" => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2]);
    }

    #[tokio::test]
    async fn client_errors_fail_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = with_retry(
            scripted(&[404], &calls),
            server_error,
            |_: &ListingError| None,
            |e: &ListingError| e.to_string(),
            "ghost",
            &RetryConfig::default(),
            None,
        )
        .await
        .expect_err("404 is not retried");

        assert_eq!(err.status, 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::new(Duration::from_millis(10), Duration::from_millis(20), 2);

        let err = with_retry(
            scripted(&[500, 502, 504, 500], &calls),
            server_error,
            |_: &ListingError| None,
            |e: &ListingError| e.to_string(),
            "acme",
            &config,
            None,
        )
        .await
        .expect_err("budget of two retries");

        assert_eq!(err.status, 504);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_attempt_waits_as_long_as_asked() {
        let calls = Arc::new(AtomicU32::new(0));
        let events: Arc<Mutex<Vec<RefreshProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        });

        let started = tokio::time::Instant::now();
        let result = with_retry(
            scripted(&[429], &calls),
            throttled_or_server_error,
            throttle_for(30),
            |e: &ListingError| e.to_string(),
            "acme",
            &RetryConfig::default(),
            Some(&callback),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert!(started.elapsed() >= Duration::from_secs(30));
        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        assert!(matches!(
            events.as_slice(),
            [RefreshProgress::RetryBackoff {
                retry_after_ms: 30_000,
                attempt: 1,
                ..
            }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_beyond_backoff_ceiling_is_left_to_caller() {
        let calls = Arc::new(AtomicU32::new(0));

        let started = tokio::time::Instant::now();
        let err = with_retry(
            scripted(&[429], &calls),
            throttled_or_server_error,
            throttle_for(3600),
            |e: &ListingError| e.to_string(),
            "acme",
            &RetryConfig::default(),
            None,
        )
        .await
        .expect_err("an hour exceeds the 60s ceiling");

        assert_eq!(err.status, 429);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
