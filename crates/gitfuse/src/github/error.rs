//! GitHub API error types.

use std::time::Duration;

use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when interacting with the GitHub API.
#[derive(Debug, Clone, Error)]
pub enum GitHubError {
    #[error("Authentication failed: the token is invalid or expired")]
    Auth,

    #[error("Rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The repository exists but has no commits yet (HTTP 409 on the trees API).
    #[error("Repository is empty: {resource}")]
    EmptyRepository { resource: String },

    #[error("Transient error: {message}")]
    Transient { message: String },

    #[error("Failed to decode response from {route}: {message}")]
    Decode { route: String, message: String },
}

impl GitHubError {
    /// Create a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a decode error for the given route.
    pub fn decode(route: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            route: route.into(),
            message: message.to_string(),
        }
    }

    /// Whether the scheduler should back off and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }

    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth)
    }

    /// The server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<HttpError> for GitHubError {
    fn from(err: HttpError) -> Self {
        Self::transient(format!("HTTP request failed: {}", err))
    }
}

/// Check if a GitHubError is worth retrying.
pub fn is_retryable_error(e: &GitHubError) -> bool {
    e.is_retryable()
}

/// Extract a short, user-friendly error message from any error.
///
/// Takes only the first line of the error message to avoid verbose output.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}
