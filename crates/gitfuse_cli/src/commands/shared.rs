use std::path::Path;

use gitfuse::config::{ConfigError, Settings};
use gitfuse::github::{DEFAULT_HTTP_TIMEOUT, GitHubClient};
use gitfuse::{ApiRateLimiter, EtagCache};

use crate::OwnerArgs;
use crate::config::Config;

/// Merge command-line owners and update rate over the config file, then
/// validate.
///
/// Owners given on the command line replace the configured list of the same
/// kind rather than extending it.
pub(crate) fn resolve_settings(
    config: &Config,
    owners: &OwnerArgs,
    update_rate: Option<f64>,
) -> Result<Settings, ConfigError> {
    let mut raw = config.raw_settings();
    if !owners.users.is_empty() {
        raw.users = owners.users.clone();
    }
    if !owners.orgs.is_empty() {
        raw.orgs = owners.orgs.clone();
    }
    if let Some(rate) = update_rate {
        raw.update_rate = rate;
    }
    raw.validate()
}

/// Load the persistent ETag cache, or an in-memory one when no cache
/// directory can be determined.
pub(crate) fn load_etag_cache(config: &Config) -> EtagCache {
    match config.cache_dir() {
        Some(dir) => EtagCache::load(dir),
        None => {
            tracing::warn!("Could not determine cache directory, ETags will not persist");
            EtagCache::in_memory()
        }
    }
}

/// Build a client from the resolved token and API URL.
pub(crate) fn build_client(
    config: &Config,
    token_file: Option<&Path>,
    settings: Option<&Settings>,
    cache: EtagCache,
) -> Result<GitHubClient, Box<dyn std::error::Error>> {
    let token = config.github_token(token_file)?;
    let mut client =
        GitHubClient::new(token, &config.github.api_url, DEFAULT_HTTP_TIMEOUT)?.with_cache(cache);

    if let Some(rps) = settings.and_then(|s| s.requests_per_second) {
        tracing::debug!(requests_per_second = rps, "Proactive rate limiting enabled");
        client = client.with_rate_limiter(ApiRateLimiter::new(rps));
    }

    Ok(client)
}

/// Check the token before doing anything else.
///
/// A rejected token fails startup; other errors are only logged since the
/// scheduler retries them.
pub(crate) async fn verify_token(client: &GitHubClient) -> Result<(), Box<dyn std::error::Error>> {
    match client.verify_token().await {
        Ok(info) => {
            tracing::info!(
                remaining = info.remaining,
                limit = info.limit,
                reset_at = %info.reset_at,
                "GitHub token accepted"
            );
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            tracing::warn!("Could not verify GitHub token, continuing: {}", e);
            Ok(())
        }
    }
}
