//! Transport trait: one HTTP exchange, no policy.
//!
//! Retry, rate limiting and caching live in [`crate::http::Fetcher`]; a
//! transport only sends a request and reports what came back.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::FetchResult;

/// HTTP verbs the platform is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
        }
    }
}

/// Form payload. Ordered so requests (and cache keys) are reproducible.
pub type Form = IndexMap<String, String>;

/// A request as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Sent as `application/x-www-form-urlencoded` when present.
    pub form: Option<Form>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: None,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            ..Self::get(url)
        }
    }

    pub fn post(url: impl Into<String>, form: Form) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            form: Some(form),
        }
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Look up a query parameter by name.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// URL plus query string, for logs.
    pub fn display_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let qs = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.url, qs)
    }
}

/// What came back from one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
    pub body: String,
    #[serde(default)]
    pub content_length: Option<u64>,
}

impl HttpResponse {
    pub fn new(status: u16, final_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            final_url: final_url.into(),
            body: body.into(),
            content_length: None,
        }
    }

    pub fn ok(final_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(200, final_url, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Sends one request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the exchange. Errors are network-level only; any HTTP status
    /// is returned as a response.
    async fn send(&self, request: &HttpRequest) -> FetchResult<HttpResponse>;

    fn name(&self) -> &str {
        "transport"
    }
}
