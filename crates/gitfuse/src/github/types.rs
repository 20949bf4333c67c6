//! GitHub API data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rate limit state parsed from `x-ratelimit-*` response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed per period.
    pub limit: usize,
    /// Remaining requests in current period.
    pub remaining: usize,
    /// When the rate limit resets.
    pub reset_at: DateTime<Utc>,
}

/// A single rate limit resource entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResource {
    /// Maximum requests allowed per period.
    pub limit: usize,
    /// Requests used in current period.
    pub used: usize,
    /// Remaining requests in current period.
    pub remaining: usize,
    /// Unix timestamp when the rate limit resets.
    pub reset: u64,
}

impl RateLimitResource {
    /// Get the reset time as a DateTime.
    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset as i64, 0).unwrap_or_else(Utc::now)
    }
}

/// Rate limit resources from GitHub's `/rate_limit` endpoint.
///
/// Only the resources this filesystem can exhaust are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRateLimits {
    /// Core API rate limit (non-search REST endpoints).
    pub core: RateLimitResource,
    /// Search API rate limit.
    #[serde(default)]
    pub search: Option<RateLimitResource>,
    /// GraphQL API rate limit.
    #[serde(default)]
    pub graphql: Option<RateLimitResource>,
}

impl GitHubRateLimits {
    /// Named resources in display order.
    pub fn named(&self) -> Vec<(&'static str, &RateLimitResource)> {
        let mut out = vec![("core", &self.core)];
        if let Some(r) = &self.search {
            out.push(("search", r));
        }
        if let Some(r) = &self.graphql {
            out.push(("graphql", r));
        }
        out
    }
}

/// Full rate limit response from GitHub's API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRateLimitResponse {
    pub resources: GitHubRateLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiOwner {
    pub login: String,
}

/// Repository object from `/users/{u}/repos` and `/orgs/{o}/repos`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRepository {
    pub name: String,
    pub owner: ApiOwner,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Response of `/repos/{o}/{r}/git/trees/{ref}?recursive=1`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiTree {
    pub sha: String,
    #[serde(default)]
    pub tree: Vec<ApiTreeEntry>,
    /// Set when GitHub cut the listing short.
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommitRef {
    pub sha: String,
}

/// Branch or tag object from `/repos/{o}/{r}/branches` and `/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRef {
    pub name: String,
    pub commit: ApiCommitRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSignature {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Response of `/repos/{o}/{r}/git/commits/{sha}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiGitCommit {
    #[serde(default)]
    pub author: Option<ApiSignature>,
    #[serde(default)]
    pub committer: Option<ApiSignature>,
}
