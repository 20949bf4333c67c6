//! Pagination and conditional-fetch helpers for the GitHub REST API.

/// Pagination information from an API response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationInfo {
    /// Total number of pages (if known).
    pub total_pages: Option<u32>,
    /// Next page number (if there are more pages).
    pub next_page: Option<u32>,
}

impl PaginationInfo {
    /// Returns true if there are more pages to fetch.
    #[inline]
    pub fn has_more(&self) -> bool {
        self.next_page.is_some()
    }
}

/// Result of a conditional GET request using ETag caching.
///
/// When making a conditional request with an `If-None-Match` header containing
/// a cached ETag, the server may return:
/// - 304 Not Modified: The cached data is still valid
/// - 200 OK: New data with an optional new ETag
#[derive(Debug, Clone)]
pub enum FetchResult<T> {
    /// Server returned 304 Not Modified; cached data is still valid.
    NotModified,
    /// Server returned new data with an optional ETag for future caching.
    Fetched {
        data: T,
        etag: Option<String>,
        pagination: PaginationInfo,
    },
}

impl<T> FetchResult<T> {
    /// Returns true if the result indicates not modified (cache hit).
    #[inline]
    pub fn is_not_modified(&self) -> bool {
        matches!(self, FetchResult::NotModified)
    }
}

/// Cache statistics for a multi-page fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Pages answered with 304 Not Modified.
    pub cache_hits: u32,
    /// Pages fetched with a full body.
    pub pages_fetched: u32,
}

/// Pagination information extracted from GitHub's Link header.
#[derive(Debug, Clone, Default)]
pub struct LinkPagination {
    /// The last page number (from rel="last" link).
    pub last_page: Option<u32>,
    /// The next page number (from rel="next" link).
    pub next_page: Option<u32>,
}

impl LinkPagination {
    /// Convert to the shared PaginationInfo type.
    pub fn to_pagination_info(&self) -> PaginationInfo {
        PaginationInfo {
            total_pages: self.last_page,
            next_page: self.next_page,
        }
    }
}

/// Parse the Link header to extract pagination info.
///
/// GitHub Link headers look like:
/// `<https://api.github.com/...&page=2>; rel="next", <https://api.github.com/...&page=5>; rel="last"`
pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut info = LinkPagination::default();

    for part in link_header.split(',') {
        let part = part.trim();

        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some(rel_type)) = (url, rel)
            && let Some(page_num) = extract_page_from_url(url)
        {
            match rel_type {
                "last" => info.last_page = Some(page_num),
                "next" => info.next_page = Some(page_num),
                _ => {}
            }
        }
    }

    info
}

/// Extract the page parameter from a URL.
fn extract_page_from_url(url: &str) -> Option<u32> {
    let query_start = url.find('?')?;
    let query = &url[query_start + 1..];

    for param in query.split('&') {
        if let Some(value) = param.strip_prefix("page=") {
            return value.parse().ok();
        }
    }

    None
}
