//! Fetcher: a transport wrapped in retry, rate limiting and caching.
//!
//! Every request of a crawl goes through [`Fetcher::fetch_with`], which asks
//! the caller's inspector about each response before the retry classifier
//! sees it. The inspector is how the session layer folds protocol faults
//! (error page redirects, empty bodies, reset range selectors) into retries.

use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::DiskCache;
use super::retry::{is_acceptable, RetryPolicy};
use crate::error::{FetchError, FetchResult};
use crate::traits::transport::{HttpRequest, HttpResponse, Transport};
use crate::types::config::CrawlSettings;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// What an inspector decided about one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// Let the retry classifier judge the status.
    Accept,
    /// Retry regardless of status. The inspector may have edited the request.
    Retry(String),
    /// Permanent absence; stop without retrying.
    Gone,
}

/// Retrying, rate-limited, optionally caching HTTP client.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    limiter: Option<Arc<DefaultRateLimiter>>,
    cache: Option<DiskCache>,
}

impl Fetcher {
    /// Fetcher with default retry policy and no rate limit or cache.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            limiter: None,
            cache: None,
        }
    }

    /// Build from crawl settings.
    pub fn from_settings(transport: Arc<dyn Transport>, settings: &CrawlSettings) -> Self {
        let mut fetcher = Self::new(transport)
            .with_retry(RetryPolicy::new(settings.retry_attempts, settings.retry_wait()))
            .with_requests_per_minute(settings.requests_per_minute);
        if let Some(dir) = &settings.cache_dir {
            fetcher = fetcher.with_cache(DiskCache::new(dir));
        }
        fetcher
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Limit successful requests per minute. 0 disables the limit.
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.limiter = NonZeroU32::new(rpm)
            .map(|rpm| Arc::new(RateLimiter::direct(Quota::per_minute(rpm))));
        self
    }

    pub fn with_cache(mut self, cache: DiskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetch with status-only classification.
    pub async fn fetch(&self, request: HttpRequest) -> FetchResult<HttpResponse> {
        self.fetch_with(request, |_, _| Inspection::Accept).await
    }

    /// Fetch, consulting `inspect` on every response before the retry
    /// classifier. Returns the first acceptable response.
    pub async fn fetch_with<F>(&self, mut request: HttpRequest, mut inspect: F) -> FetchResult<HttpResponse>
    where
        F: FnMut(&HttpResponse, &mut HttpRequest) -> Inspection + Send,
    {
        let cache_request = request.clone();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&cache_request).await {
                return Ok(hit);
            }
        }

        let url = request.display_url();
        let mut last_reason = String::new();
        let mut last_status = None;

        for attempt in 1..=self.retry.attempts {
            if attempt > 1 && !self.retry.delay.is_zero() {
                tokio::time::sleep(self.retry.delay).await;
            }

            debug!(url = %url, method = request.method.as_str(), attempt, "HTTP request");
            let response = match self.transport.send(&request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "Request failed");
                    last_reason = e.to_string();
                    last_status = None;
                    continue;
                }
            };

            last_status = Some(response.status);
            match inspect(&response, &mut request) {
                Inspection::Gone => return Err(FetchError::Gone { url }),
                Inspection::Retry(reason) => {
                    warn!(url = %url, attempt, status = response.status, reason = %reason, "Retrying");
                    last_reason = reason;
                    continue;
                }
                Inspection::Accept => {}
            }

            if !is_acceptable(&response) {
                warn!(url = %url, attempt, status = response.status, "Unacceptable status");
                last_reason = format!("HTTP {}", response.status);
                continue;
            }

            if let Some(cache) = &self.cache {
                if let Err(e) = cache.put(&cache_request, &response).await {
                    warn!(url = %url, error = %e, "Failed to write cache entry");
                }
            }
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            return Ok(response);
        }

        Err(FetchError::RetriesExhausted {
            url,
            attempts: self.retry.attempts,
            reason: last_reason,
            status: last_status,
        })
    }

    /// Fetch and decode JSON.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, request: HttpRequest) -> crate::error::Result<T> {
        let response = self.fetch(request).await?;
        Ok(response.json()?)
    }
}
