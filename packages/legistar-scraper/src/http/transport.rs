//! reqwest-backed transport.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::traits::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::types::config::CrawlSettings;

/// Transport over a shared `reqwest::Client`.
///
/// Redirects are followed; the final URL is reported so the session layer can
/// spot the platform's error page.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with the given timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                source: Box::new(e),
            })?;
        Ok(Self { client })
    }

    pub fn from_settings(settings: &CrawlSettings) -> FetchResult<Self> {
        Self::new(settings.timeout(), &settings.user_agent)
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> FetchResult<HttpResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Head => reqwest::Method::HEAD,
        };

        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let to_err = |e: reqwest::Error| FetchError::Transport {
            url: request.display_url(),
            source: Box::new(e),
        };

        let response = builder.send().await.map_err(to_err)?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_length = response.content_length();
        let body = response.text().await.map_err(to_err)?;

        debug!(url = %final_url, status, bytes = body.len(), "HTTP response");

        Ok(HttpResponse {
            status,
            final_url,
            body,
            content_length,
        })
    }

    fn name(&self) -> &str {
        "reqwest"
    }
}
