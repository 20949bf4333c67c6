//! GitHub REST client with ETag revalidation and rate limit tracking.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::convert::{commit_time, to_git_ref, to_repository_entry, to_tree_entry};
use super::error::GitHubError;
use super::pagination::{CacheStats, FetchResult, PaginationInfo, parse_link_header};
use super::token::GitHubToken;
use super::types::{
    ApiGitCommit, ApiRef, ApiRepository, ApiTree, GitHubRateLimitResponse, GitHubRateLimits,
    RateLimitInfo,
};
use crate::catalog::{Owner, OwnerKind, RepositoryEntry};
use crate::etag_cache::{CachedResponse, EtagCache};
use crate::http::{
    HttpError, HttpHeaders, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, header_get,
};
use crate::rate_limit::ApiRateLimiter;
use crate::source::{GitRef, RefKind, RepositorySource, TreeEntry};

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default per-request HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait applied when GitHub throttles without saying for how long.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: u32 = 100;

/// Quota changes are logged each time `remaining` crosses a multiple of this.
const QUOTA_LOG_INTERVAL: usize = 100;

/// Extract ETag from response headers.
pub fn extract_etag(headers: &HttpHeaders) -> Option<String> {
    header_get(headers, "etag").map(String::from)
}

/// Extract rate limit info from GitHub response headers.
pub fn parse_rate_limit_headers(headers: &HttpHeaders) -> Option<RateLimitInfo> {
    let limit = header_get(headers, "x-ratelimit-limit")?.parse::<usize>().ok()?;
    let remaining = header_get(headers, "x-ratelimit-remaining")?
        .parse::<usize>()
        .ok()?;
    let reset_epoch = header_get(headers, "x-ratelimit-reset")?
        .parse::<i64>()
        .ok()?;
    let reset_at = DateTime::from_timestamp(reset_epoch, 0).unwrap_or_else(Utc::now);
    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
    })
}

/// How long GitHub asked us to wait.
///
/// Uses `Retry-After` when present, then the primary quota reset time when
/// the quota is exhausted, and [`DEFAULT_RETRY_AFTER`] otherwise.
pub fn retry_after_from_headers(headers: &HttpHeaders, now: DateTime<Utc>) -> Duration {
    if let Some(secs) = header_get(headers, "retry-after").and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Duration::from_secs(secs);
    }

    if let Some(info) = parse_rate_limit_headers(headers)
        && info.remaining == 0
    {
        let wait = (info.reset_at - now).num_seconds().max(0) as u64;
        return Duration::from_secs(wait + 1);
    }

    DEFAULT_RETRY_AFTER
}

/// Map a non-success HTTP status to an error.
pub fn classify_status(
    status: u16,
    headers: &HttpHeaders,
    resource: &str,
    now: DateTime<Utc>,
) -> GitHubError {
    match status {
        401 => GitHubError::Auth,
        403 | 429 => GitHubError::RateLimited {
            retry_after: retry_after_from_headers(headers, now),
        },
        404 => GitHubError::not_found(resource),
        409 => GitHubError::EmptyRepository {
            resource: resource.to_string(),
        },
        _ => GitHubError::transient(format!(
            "Unexpected HTTP status {} for {}",
            status, resource
        )),
    }
}

/// Percent-encode a single path segment (branch names may contain `/`).
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Route for one page of an owner's repositories.
pub fn repos_route(owner: &Owner, page: u32) -> String {
    let prefix = match owner.kind {
        OwnerKind::User => "users",
        OwnerKind::Organization => "orgs",
    };
    format!(
        "/{}/{}/repos?per_page={}&page={}",
        prefix,
        encode_segment(&owner.name),
        PER_PAGE,
        page
    )
}

/// Route for one page of a repository's branches or tags.
pub fn refs_route(owner: &str, repo: &str, kind: RefKind, page: u32) -> String {
    format!(
        "/repos/{}/{}/{}?per_page={}&page={}",
        encode_segment(owner),
        encode_segment(repo),
        kind.dir_name(),
        PER_PAGE,
        page
    )
}

#[derive(Debug, Default)]
struct RateState {
    last: Option<RateLimitInfo>,
    logged_bucket: Option<usize>,
}

/// Authenticated GitHub API client.
///
/// Cheap to clone; clones share the transport, ETag cache, rate limiter and
/// quota tracking.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    token: GitHubToken,
    api_url: Arc<str>,
    cache: EtagCache,
    rate_limiter: Option<ApiRateLimiter>,
    rate_state: Arc<Mutex<RateState>>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client backed by reqwest.
    pub fn new(token: GitHubToken, api_url: &str, timeout: Duration) -> Result<Self, GitHubError> {
        let transport = ReqwestTransport::with_timeout(timeout)?;
        Ok(Self::with_transport(Arc::new(transport), token, api_url))
    }

    /// Create a client over an arbitrary transport.
    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        token: GitHubToken,
        api_url: &str,
    ) -> Self {
        Self {
            transport,
            token,
            api_url: Arc::from(api_url.trim_end_matches('/')),
            cache: EtagCache::in_memory(),
            rate_limiter: None,
            rate_state: Arc::new(Mutex::new(RateState::default())),
        }
    }

    /// Use the given ETag cache (e.g. one loaded from disk).
    #[must_use]
    pub fn with_cache(mut self, cache: EtagCache) -> Self {
        self.cache = cache;
        self
    }

    /// Pace every request through a proactive rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: ApiRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn etag_cache(&self) -> &EtagCache {
        &self.cache
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Most recent quota seen in response headers.
    pub fn last_rate_limit(&self) -> Option<RateLimitInfo> {
        self.rate_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last
            .clone()
    }

    fn request(&self, route: &str, accept: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{}", self.api_url, route))
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("Authorization", format!("Bearer {}", self.token.expose()))
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }
        let response = self.transport.send(request).await?;
        self.record_rate_limit(&response.headers);
        Ok(response)
    }

    fn record_rate_limit(&self, headers: &HttpHeaders) {
        let Some(info) = parse_rate_limit_headers(headers) else {
            return;
        };

        let mut state = self.rate_state.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = info.remaining / QUOTA_LOG_INTERVAL;
        if state.logged_bucket != Some(bucket) {
            state.logged_bucket = Some(bucket);
            if info.remaining == 0 {
                tracing::warn!(
                    limit = info.limit,
                    reset_at = %info.reset_at,
                    "GitHub API quota exhausted"
                );
            } else {
                tracing::debug!(
                    remaining = info.remaining,
                    limit = info.limit,
                    reset_at = %info.reset_at,
                    "GitHub API quota"
                );
            }
        }
        state.last = Some(info);
    }

    /// Make a GET request with optional conditional ETag.
    ///
    /// If `cached_etag` is provided, sends an `If-None-Match` header.
    /// Returns `FetchResult::NotModified` if the server returns 304.
    /// Also extracts pagination info from the Link header.
    pub async fn get_conditional(
        &self,
        route: &str,
        cached_etag: Option<&str>,
    ) -> Result<FetchResult<Vec<u8>>, GitHubError> {
        let mut request = self.request(route, ACCEPT_JSON);
        if let Some(etag) = cached_etag {
            request = request.header("If-None-Match", etag);
        }

        let response = self.send(request).await?;

        match response.status {
            304 => Ok(FetchResult::NotModified),
            200 => {
                let etag = extract_etag(&response.headers);
                let pagination = response
                    .header("link")
                    .map(|h| parse_link_header(h).to_pagination_info())
                    .unwrap_or_default();
                Ok(FetchResult::Fetched {
                    data: response.body,
                    etag,
                    pagination,
                })
            }
            status => Err(classify_status(
                status,
                &response.headers,
                route,
                Utc::now(),
            )),
        }
    }

    /// GET a JSON route through the ETag cache.
    async fn get_cached<T: DeserializeOwned>(
        &self,
        route: &str,
        stats: &mut CacheStats,
    ) -> Result<(T, PaginationInfo), GitHubError> {
        let cached = self.cache.get(route);
        let result = self
            .get_conditional(route, cached.as_ref().map(|c| c.etag.as_str()))
            .await?;

        let (body, pagination) = match (result, cached) {
            (FetchResult::NotModified, Some(cached)) => {
                stats.cache_hits += 1;
                let pagination = PaginationInfo {
                    total_pages: None,
                    next_page: cached.next_page,
                };
                (cached.body, pagination)
            }
            (FetchResult::NotModified, None) => {
                return Err(GitHubError::transient(format!(
                    "304 Not Modified without a cached body for {}",
                    route
                )));
            }
            (
                FetchResult::Fetched {
                    data,
                    etag,
                    pagination,
                },
                _,
            ) => {
                stats.pages_fetched += 1;
                let body = String::from_utf8(data).map_err(|e| GitHubError::decode(route, e))?;
                match etag {
                    Some(etag) => self.cache.put(
                        route,
                        CachedResponse {
                            etag,
                            body: body.clone(),
                            next_page: pagination.next_page,
                        },
                    ),
                    None => self.cache.remove(route),
                }
                (body, pagination)
            }
        };

        match serde_json::from_str(&body) {
            Ok(data) => Ok((data, pagination)),
            Err(e) => {
                self.cache.remove(route);
                Err(GitHubError::decode(route, e))
            }
        }
    }

    /// List an owner's repositories across all pages.
    #[tracing::instrument(skip(self, owner), fields(owner = %owner.name))]
    pub async fn list_repositories_paged(
        &self,
        owner: &Owner,
    ) -> Result<(Vec<RepositoryEntry>, CacheStats), GitHubError> {
        let mut stats = CacheStats::default();
        let mut repos: Vec<RepositoryEntry> = Vec::new();
        let mut page = 1u32;

        loop {
            let route = repos_route(owner, page);
            let (items, pagination): (Vec<ApiRepository>, _) =
                self.get_cached(&route, &mut stats).await?;
            repos.extend(items.iter().map(to_repository_entry));

            match pagination.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        repos.sort_by(|a, b| a.name.cmp(&b.name));
        repos.dedup_by(|a, b| a.name == b.name);

        tracing::debug!(
            repos = repos.len(),
            cache_hits = stats.cache_hits,
            pages_fetched = stats.pages_fetched,
            "Listed repositories"
        );
        Ok((repos, stats))
    }

    /// List a repository's branches or tags across all pages.
    #[tracing::instrument(skip(self, kind))]
    pub async fn list_refs_paged(
        &self,
        owner: &str,
        repo: &str,
        kind: RefKind,
    ) -> Result<(Vec<GitRef>, CacheStats), GitHubError> {
        let mut stats = CacheStats::default();
        let mut refs: Vec<GitRef> = Vec::new();
        let mut page = 1u32;

        loop {
            let route = refs_route(owner, repo, kind, page);
            let (items, pagination): (Vec<ApiRef>, _) =
                match self.get_cached(&route, &mut stats).await {
                    Ok(found) => found,
                    Err(GitHubError::EmptyRepository { .. }) => break,
                    Err(e) => return Err(e),
                };
            refs.extend(items.iter().map(to_git_ref));

            match pagination.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        refs.sort_by(|a, b| a.name.cmp(&b.name));
        refs.dedup_by(|a, b| a.name == b.name);

        tracing::debug!(
            refs = refs.len(),
            kind = kind.dir_name(),
            cache_hits = stats.cache_hits,
            "Listed refs"
        );
        Ok((refs, stats))
    }

    /// Fetch all rate limit resources.
    pub async fn get_rate_limits(&self) -> Result<GitHubRateLimits, GitHubError> {
        let route = "/rate_limit";
        let response = self.send(self.request(route, ACCEPT_JSON)).await?;
        if response.status != 200 {
            return Err(classify_status(
                response.status,
                &response.headers,
                route,
                Utc::now(),
            ));
        }
        let parsed: GitHubRateLimitResponse =
            serde_json::from_slice(&response.body).map_err(|e| GitHubError::decode(route, e))?;
        Ok(parsed.resources)
    }

    /// Check that the token is accepted. Does not consume quota.
    pub async fn verify_token(&self) -> Result<RateLimitInfo, GitHubError> {
        let limits = self.get_rate_limits().await?;
        Ok(RateLimitInfo {
            limit: limits.core.limit,
            remaining: limits.core.remaining,
            reset_at: limits.core.reset_at(),
        })
    }
}

#[async_trait]
impl RepositorySource for GitHubClient {
    async fn list_repositories(&self, owner: &Owner) -> Result<Vec<RepositoryEntry>, GitHubError> {
        self.list_repositories_paged(owner)
            .await
            .map(|(repos, _)| repos)
    }

    async fn fetch_file_tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<Vec<TreeEntry>, GitHubError> {
        let route = format!(
            "/repos/{}/{}/git/trees/{}?recursive=1",
            encode_segment(owner),
            encode_segment(repo),
            encode_segment(git_ref)
        );
        let mut stats = CacheStats::default();
        let tree: ApiTree = match self.get_cached(&route, &mut stats).await {
            Ok((tree, _)) => tree,
            Err(GitHubError::EmptyRepository { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        if tree.truncated {
            tracing::warn!(
                "File tree of {}/{} is truncated by GitHub; some files will be missing",
                owner,
                repo
            );
        }

        Ok(tree.tree.iter().filter_map(to_tree_entry).collect())
    }

    async fn list_refs(
        &self,
        owner: &str,
        repo: &str,
        kind: RefKind,
    ) -> Result<Vec<GitRef>, GitHubError> {
        self.list_refs_paged(owner, repo, kind)
            .await
            .map(|(refs, _)| refs)
    }

    async fn fetch_commit_time(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<DateTime<Utc>, GitHubError> {
        let route = format!(
            "/repos/{}/{}/git/commits/{}",
            encode_segment(owner),
            encode_segment(repo),
            encode_segment(sha)
        );
        let mut stats = CacheStats::default();
        let (commit, _): (ApiGitCommit, _) = self.get_cached(&route, &mut stats).await?;
        commit_time(&commit).ok_or_else(|| GitHubError::decode(&route, "commit has no date"))
    }

    async fn fetch_blob(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<u8>, GitHubError> {
        let route = format!(
            "/repos/{}/{}/git/blobs/{}",
            encode_segment(owner),
            encode_segment(repo),
            encode_segment(sha)
        );
        let response = self.send(self.request(&route, ACCEPT_RAW)).await?;
        match response.status {
            200 => Ok(response.body),
            status => Err(classify_status(
                status,
                &response.headers,
                &route,
                Utc::now(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;
    use chrono::TimeZone;

    const API: &str = "https://api.test";

    fn client(transport: &MockTransport) -> GitHubClient {
        GitHubClient::with_transport(
            Arc::new(transport.clone()),
            GitHubToken::new("ghp_test").unwrap(),
            API,
        )
    }

    fn repo_json(name: &str) -> String {
        format!(
            r#"{{"name":"{name}","owner":{{"login":"alice"}},"default_branch":"main","size":3,
               "private":false,"created_at":"2020-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z",
               "pushed_at":"2024-02-01T00:00:00Z"}}"#
        )
    }

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_classify_status() {
        let now = Utc::now();
        let h = HttpHeaders::new();
        assert!(matches!(
            classify_status(401, &h, "/x", now),
            GitHubError::Auth
        ));
        assert!(matches!(
            classify_status(404, &h, "/x", now),
            GitHubError::NotFound { .. }
        ));
        assert!(matches!(
            classify_status(409, &h, "/x", now),
            GitHubError::EmptyRepository { .. }
        ));
        assert!(matches!(
            classify_status(502, &h, "/x", now),
            GitHubError::Transient { .. }
        ));
        for status in [403, 429] {
            assert_eq!(
                classify_status(status, &h, "/x", now).retry_after(),
                Some(DEFAULT_RETRY_AFTER)
            );
        }
    }

    #[test]
    fn test_retry_after_prefers_header_then_reset() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let reset = (now.timestamp() + 120).to_string();

        let h = headers(&[("Retry-After", "7")]);
        assert_eq!(retry_after_from_headers(&h, now), Duration::from_secs(7));

        let h = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", reset.as_str()),
        ]);
        assert_eq!(retry_after_from_headers(&h, now), Duration::from_secs(121));

        // Secondary limits keep quota but still throttle.
        let h = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "10"),
            ("x-ratelimit-reset", reset.as_str()),
        ]);
        assert_eq!(retry_after_from_headers(&h, now), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn test_parse_rate_limit_headers() {
        let h = headers(&[
            ("X-RateLimit-Limit", "5000"),
            ("X-RateLimit-Remaining", "4321"),
            ("X-RateLimit-Reset", "2000000000"),
        ]);
        let info = parse_rate_limit_headers(&h).unwrap();
        assert_eq!(info.limit, 5000);
        assert_eq!(info.remaining, 4321);
        assert_eq!(info.reset_at.timestamp(), 2000000000);

        assert!(parse_rate_limit_headers(&headers(&[("x-ratelimit-limit", "1")])).is_none());
    }

    #[test]
    fn test_encode_segment_and_routes() {
        assert_eq!(encode_segment("feature/x y"), "feature%2Fx%20y");
        assert_eq!(encode_segment("main"), "main");
        assert_eq!(
            repos_route(&Owner::user("alice"), 1),
            "/users/alice/repos?per_page=100&page=1"
        );
        assert_eq!(
            repos_route(&Owner::organization("acme"), 3),
            "/orgs/acme/repos?per_page=100&page=3"
        );
    }

    #[tokio::test]
    async fn test_list_repositories_follows_pagination_and_sorts() {
        let transport = MockTransport::new();
        let page1 = format!("{API}/users/alice/repos?per_page=100&page=1");
        let page2 = format!("{API}/users/alice/repos?per_page=100&page=2");
        let link = format!(r#"<{page2}>; rel="next", <{page2}>; rel="last""#);

        transport.push_json(
            &page1,
            &format!("[{},{}]", repo_json("zeta"), repo_json("alpha")),
            &[("Link", link.as_str()), ("ETag", "\"p1\"")],
        );
        transport.push_json(&page2, &format!("[{}]", repo_json("mid")), &[]);

        let client = client(&transport);
        let (repos, stats) = client
            .list_repositories_paged(&Owner::user("alice"))
            .await
            .unwrap();

        let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(stats.pages_fetched, 2);
        assert_eq!(stats.cache_hits, 0);

        // Page 1 had an ETag and is cached; page 2 had none.
        let cache = client.etag_cache();
        assert_eq!(
            cache.etag(&repos_route(&Owner::user("alice"), 1)).as_deref(),
            Some("\"p1\"")
        );
        assert!(cache.get(&repos_route(&Owner::user("alice"), 2)).is_none());

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            header_get(&requests[0].headers, "authorization"),
            Some("Bearer ghp_test")
        );
    }

    #[tokio::test]
    async fn test_not_modified_reuses_cached_body_and_pagination() {
        let transport = MockTransport::new();
        let owner = Owner::organization("acme");
        let route1 = repos_route(&owner, 1);
        let route2 = repos_route(&owner, 2);

        let client = client(&transport);
        client.etag_cache().put(
            route1.clone(),
            CachedResponse {
                etag: "\"e1\"".to_string(),
                body: format!("[{}]", repo_json("one")),
                next_page: Some(2),
            },
        );
        client.etag_cache().put(
            route2.clone(),
            CachedResponse {
                etag: "\"e2\"".to_string(),
                body: format!("[{}]", repo_json("two")),
                next_page: None,
            },
        );

        transport.push_status(format!("{API}{route1}"), 304, &[]);
        transport.push_status(format!("{API}{route2}"), 304, &[]);

        let (repos, stats) = client.list_repositories_paged(&owner).await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.pages_fetched, 0);

        let requests = transport.requests();
        assert_eq!(
            header_get(&requests[0].headers, "if-none-match"),
            Some("\"e1\"")
        );
        assert_eq!(
            header_get(&requests[1].headers, "if-none-match"),
            Some("\"e2\"")
        );
    }

    #[tokio::test]
    async fn test_list_repositories_maps_errors() {
        let transport = MockTransport::new();
        let owner = Owner::user("ghost");
        transport.push_status(format!("{API}{}", repos_route(&owner, 1)), 404, &[]);
        transport.push_status(format!("{API}{}", repos_route(&owner, 1)), 401, &[]);
        transport.push_status(
            format!("{API}{}", repos_route(&owner, 1)),
            429,
            &[("Retry-After", "3")],
        );

        let client = client(&transport);
        assert!(matches!(
            client.list_repositories(&owner).await,
            Err(GitHubError::NotFound { .. })
        ));
        assert!(matches!(
            client.list_repositories(&owner).await,
            Err(GitHubError::Auth)
        ));
        assert_eq!(
            client
                .list_repositories(&owner)
                .await
                .unwrap_err()
                .retry_after(),
            Some(Duration::from_secs(3))
        );
        // No registered response at all is a transport failure.
        assert!(matches!(
            client.list_repositories(&owner).await,
            Err(GitHubError::Transient { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error_and_not_cached() {
        let transport = MockTransport::new();
        let owner = Owner::user("alice");
        let route = repos_route(&owner, 1);
        transport.push_json(format!("{API}{route}"), "{oops", &[("ETag", "\"bad\"")]);

        let client = client(&transport);
        assert!(matches!(
            client.list_repositories(&owner).await,
            Err(GitHubError::Decode { .. })
        ));
        assert!(client.etag_cache().get(&route).is_none());
    }

    #[tokio::test]
    async fn test_fetch_file_tree_and_empty_repository() {
        let transport = MockTransport::new();
        transport.push_json(
            format!("{API}/repos/alice/demo/git/trees/main?recursive=1"),
            r#"{"sha":"root","truncated":false,"tree":[
                {"path":"README.md","mode":"100644","type":"blob","sha":"b1","size":5},
                {"path":"src","mode":"040000","type":"tree","sha":"t1"}
            ]}"#,
            &[],
        );
        transport.push_status(
            format!("{API}/repos/alice/empty/git/trees/main?recursive=1"),
            409,
            &[],
        );

        let client = client(&transport);
        let tree = client.fetch_file_tree("alice", "demo", "main").await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0], TreeEntry::blob("README.md", "b1", 5));

        let empty = client
            .fetch_file_tree("alice", "empty", "main")
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_list_refs_follows_pagination() {
        let transport = MockTransport::new();
        let page1 = format!("{API}{}", refs_route("alice", "demo", RefKind::Branch, 1));
        let page2 = format!("{API}{}", refs_route("alice", "demo", RefKind::Branch, 2));
        let link = format!(r#"<{page2}>; rel="next""#);
        transport.push_json(
            &page1,
            r#"[{"name":"main","commit":{"sha":"c1","url":"x"},"protected":true},
                {"name":"feature/login","commit":{"sha":"c2"}}]"#,
            &[("Link", link.as_str())],
        );
        transport.push_json(&page2, r#"[{"name":"dev","commit":{"sha":"c3"}}]"#, &[]);

        let refs = client(&transport)
            .list_refs("alice", "demo", RefKind::Branch)
            .await
            .unwrap();
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["dev", "feature/login", "main"]);
        assert_eq!(refs[1], GitRef::new("feature/login", "c2"));
    }

    #[tokio::test]
    async fn test_list_refs_of_empty_repository() {
        let transport = MockTransport::new();
        transport.push_status(
            format!("{API}{}", refs_route("alice", "empty", RefKind::Tag, 1)),
            409,
            &[],
        );

        let tags = client(&transport)
            .list_refs("alice", "empty", RefKind::Tag)
            .await
            .unwrap();
        assert!(tags.is_empty());
        assert_eq!(
            refs_route("alice", "empty", RefKind::Tag, 1),
            "/repos/alice/empty/tags?per_page=100&page=1"
        );
    }

    #[tokio::test]
    async fn test_fetch_commit_time() {
        let transport = MockTransport::new();
        transport.push_json(
            format!("{API}/repos/alice/demo/git/commits/c1"),
            r#"{"sha":"c1","author":{"name":"Alice","date":"2024-03-05T08:30:00Z"},
                "committer":{"name":"Alice","date":"2024-03-06T08:30:00Z"}}"#,
            &[],
        );
        transport.push_status(format!("{API}/repos/alice/demo/git/commits/c9"), 404, &[]);

        let client = client(&transport);
        assert_eq!(
            client.fetch_commit_time("alice", "demo", "c1").await.unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 5, 8, 30, 0).unwrap()
        );
        assert!(matches!(
            client.fetch_commit_time("alice", "demo", "c9").await,
            Err(GitHubError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_blob_requests_raw_media_type() {
        let transport = MockTransport::new();
        transport.push_response(
            format!("{API}/repos/alice/demo/git/blobs/b1"),
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"hello".to_vec(),
            },
        );

        let client = client(&transport);
        let bytes = client.fetch_blob("alice", "demo", "b1").await.unwrap();
        assert_eq!(bytes, b"hello".to_vec());
        assert_eq!(
            header_get(&transport.requests()[0].headers, "accept"),
            Some(ACCEPT_RAW)
        );
    }

    #[tokio::test]
    async fn test_verify_token_and_quota_tracking() {
        let transport = MockTransport::new();
        transport.push_json(
            format!("{API}/rate_limit"),
            r#"{"resources":{"core":{"limit":5000,"used":10,"remaining":4990,"reset":2000000000}}}"#,
            &[
                ("x-ratelimit-limit", "5000"),
                ("x-ratelimit-remaining", "4990"),
                ("x-ratelimit-reset", "2000000000"),
            ],
        );
        transport.push_status(format!("{API}/rate_limit"), 401, &[]);

        let client = client(&transport);
        let info = client.verify_token().await.unwrap();
        assert_eq!(info.remaining, 4990);
        assert_eq!(client.last_rate_limit().map(|r| r.remaining), Some(4990));

        assert!(matches!(
            client.verify_token().await,
            Err(GitHubError::Auth)
        ));
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let transport = MockTransport::new();
        let client = client(&transport);
        assert!(!format!("{:?}", client).contains("ghp_test"));
    }
}
