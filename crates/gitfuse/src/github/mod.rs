//! GitHub API client for listing repositories and reading their contents.
//!
//! # Module Structure
//!
//! - [`error`] - Error types for GitHub API operations
//! - [`types`] - Wire types for the REST endpoints used here
//! - [`client`] - The client: conditional requests, pagination, quota tracking
//! - [`convert`] - Conversion to catalog and tree types
//! - [`token`] - Bearer token handling
//!
//! ```ignore
//! use gitfuse::github::{GitHubClient, GitHubToken, DEFAULT_API_URL, DEFAULT_HTTP_TIMEOUT};
//!
//! let token = GitHubToken::from_file("~/.github-token")?;
//! let client = GitHubClient::new(token, DEFAULT_API_URL, DEFAULT_HTTP_TIMEOUT)?;
//! client.verify_token().await?;
//! ```

mod client;
mod convert;
mod error;
mod pagination;
mod token;
mod types;

pub use client::{
    DEFAULT_API_URL, DEFAULT_HTTP_TIMEOUT, DEFAULT_RETRY_AFTER, GitHubClient, classify_status,
    extract_etag, parse_rate_limit_headers, repos_route, retry_after_from_headers,
};
pub use convert::{to_repository_entry, to_tree_entry};
pub use error::{GitHubError, is_retryable_error, short_error_message};
pub use pagination::{
    CacheStats, FetchResult, LinkPagination, PaginationInfo, parse_link_header,
};
pub use token::{GitHubToken, TokenError};
pub use types::{
    ApiRepository, ApiTree, ApiTreeEntry, GitHubRateLimitResponse, GitHubRateLimits,
    RateLimitInfo, RateLimitResource,
};
