use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// HTTP headers represented as key/value pairs.
///
/// Header names are treated case-insensitively by helper functions.
pub type HttpHeaders = Vec<(String, String)>;

/// A minimal GET request. The filesystem never issues anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HttpHeaders,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no mock response registered for GET {url}")]
    NoMockResponse { url: String },
}

/// Transport boundary for all HTTP I/O.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Get the first header value matching `name` (case-insensitive).
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// A real HTTP transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gitfuse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self.client.get(&request.url);
        for (k, v) in request.headers {
            builder = builder.header(&k, &v);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let mut headers: HttpHeaders = Vec::new();
        for (name, value) in resp.headers().iter() {
            headers.push((
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            ));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
use std::collections::{HashMap, VecDeque};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// In-memory mock transport.
///
/// No sockets, no loopback HTTP servers. Responses are matched on the full URL.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[cfg(test)]
#[derive(Default)]
struct MockTransportInner {
    routes: HashMap<String, VecDeque<HttpResponse>>,
    requests: Vec<HttpRequest>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for a URL.
    ///
    /// If multiple responses are registered for the same URL, they are returned
    /// in FIFO order.
    pub fn push_response(&self, url: impl Into<String>, response: HttpResponse) {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner
            .routes
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    /// Convenience for a JSON 200 response with optional extra headers.
    pub fn push_json(&self, url: impl Into<String>, body: &str, headers: &[(&str, &str)]) {
        let mut all: HttpHeaders = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        all.push(("content-type".to_string(), "application/json".to_string()));
        self.push_response(
            url,
            HttpResponse {
                status: 200,
                headers: all,
                body: body.as_bytes().to_vec(),
            },
        );
    }

    pub fn push_status(&self, url: impl Into<String>, status: u16, headers: &[(&str, &str)]) {
        self.push_response(
            url,
            HttpResponse {
                status,
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: Vec::new(),
            },
        );
    }

    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        let inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner.requests.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");

        let url = request.url.clone();
        inner.requests.push(request);

        match inner.routes.get_mut(&url).and_then(|q| q.pop_front()) {
            Some(resp) => Ok(resp),
            None => Err(HttpError::NoMockResponse { url }),
        }
    }
}
