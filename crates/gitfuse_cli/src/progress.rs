//! Progress reporting for catalog refreshes.
//!
//! The mount runs unattended, so refresh events are rendered as structured
//! log lines rather than progress bars.

use gitfuse::catalog::{ProgressCallback, RefreshProgress};

/// Logging-based reporter for refresh events.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    /// Convert into a callback for the library.
    pub fn into_callback(self) -> ProgressCallback {
        Box::new(move |event| self.handle(event))
    }

    pub fn handle(&self, event: RefreshProgress) {
        match event {
            RefreshProgress::TickStarted { version, owners } => {
                tracing::debug!(version, owners, "Refreshing catalog");
            }

            RefreshProgress::OwnerRefreshed { owner, repos } => {
                tracing::debug!(owner = %owner, repos, "Listed repositories");
            }

            RefreshProgress::OwnerFailed { owner, error } => {
                tracing::warn!(owner = %owner, error = %error, "Refresh failed, serving previous listing");
            }

            RefreshProgress::OwnerSkipped { owner } => {
                tracing::debug!(owner = %owner, "Skipped (shutting down)");
            }

            RefreshProgress::RetryBackoff {
                resource,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(
                    resource = %resource,
                    retry_after_ms,
                    attempt,
                    "Request failed, backing off"
                );
            }

            RefreshProgress::SnapshotPublished {
                version,
                repos,
                succeeded,
                failed,
            } => {
                if failed > 0 {
                    tracing::info!(version, repos, succeeded, failed, "Catalog updated with failures");
                } else {
                    tracing::debug!(version, repos, "Catalog updated");
                }
            }

            RefreshProgress::SnapshotUnchanged { failed } => {
                tracing::warn!(failed, "Every owner failed, keeping previous catalog");
            }

            RefreshProgress::NextTick { delay } => {
                tracing::debug!(delay_secs = delay.as_secs(), "Next refresh scheduled");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
