//! Validated mount settings.
//!
//! Front ends collect options into [`RawSettings`] from wherever they like
//! (files, environment, flags) and call [`RawSettings::validate`] once at
//! startup. Any problem is a [`ConfigError`] and the mount never starts.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::catalog::{DEFAULT_CONCURRENCY, Owner};
use crate::fs::DEFAULT_FETCH_TIMEOUT;
use crate::github::TokenError;
use crate::tree::DEFAULT_BLOB_CAPACITY;

/// Default refresh period in seconds.
pub const DEFAULT_UPDATE_RATE_SECS: f64 = 300.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("update rate must be a positive number of seconds, got {0}")]
    InvalidUpdateRate(f64),

    #[error("no users or organizations configured")]
    NoOwners,

    #[error("owner {0:?} is configured more than once")]
    DuplicateOwner(String),

    #[error("invalid owner name {0:?}")]
    InvalidOwnerName(String),

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("fetch timeout must be at least 1 second")]
    ZeroFetchTimeout,

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Unvalidated settings as collected from the user.
#[derive(Debug, Clone)]
pub struct RawSettings {
    pub users: Vec<String>,
    pub orgs: Vec<String>,
    /// Refresh period in seconds.
    pub update_rate: f64,
    pub concurrency: usize,
    pub fetch_timeout_secs: u64,
    /// Proactive request rate; `None` disables the limiter.
    pub requests_per_second: Option<u32>,
    pub blob_capacity: usize,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            orgs: Vec::new(),
            update_rate: DEFAULT_UPDATE_RATE_SECS,
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            requests_per_second: None,
            blob_capacity: DEFAULT_BLOB_CAPACITY,
        }
    }
}

/// Settings that passed validation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Users first, then organizations, each in configured order.
    pub owners: Vec<Owner>,
    pub update_rate: Duration,
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    pub requests_per_second: Option<u32>,
    pub blob_capacity: usize,
}

fn check_owner_name(name: &str) -> Result<String, ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains('/') {
        return Err(ConfigError::InvalidOwnerName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

impl RawSettings {
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        if !self.update_rate.is_finite() || self.update_rate <= 0.0 {
            return Err(ConfigError::InvalidUpdateRate(self.update_rate));
        }
        let update_rate = Duration::try_from_secs_f64(self.update_rate)
            .map_err(|_| ConfigError::InvalidUpdateRate(self.update_rate))?;
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::ZeroFetchTimeout);
        }

        let mut owners = Vec::with_capacity(self.users.len() + self.orgs.len());
        let mut seen = HashSet::new();

        let named = self
            .users
            .iter()
            .map(|n| (n, true))
            .chain(self.orgs.iter().map(|n| (n, false)));
        for (raw, is_user) in named {
            let name = check_owner_name(raw)?;
            // GitHub logins are case-insensitive, so "Alice" and "alice" collide.
            if !seen.insert(name.to_lowercase()) {
                return Err(ConfigError::DuplicateOwner(name));
            }
            owners.push(if is_user {
                Owner::user(name)
            } else {
                Owner::organization(name)
            });
        }

        if owners.is_empty() {
            return Err(ConfigError::NoOwners);
        }

        Ok(Settings {
            owners,
            update_rate,
            concurrency: self.concurrency,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            requests_per_second: self.requests_per_second.filter(|&rps| rps > 0),
            blob_capacity: self.blob_capacity.max(1),
        })
    }
}
