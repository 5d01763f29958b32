//! Shared setup for the integration tests.

#![allow(dead_code)]

use legistar_scraper::testing::MockTransport;
use legistar_scraper::{CrawlContext, Fetcher, JurisdictionConfig, RetryPolicy};
use std::sync::Arc;

pub const WEB: &str = "https://metro.legistar.com";
pub const API: &str = "https://webapi.legistar.com/v1/metro";

pub fn metro_config() -> JurisdictionConfig {
    JurisdictionConfig::new("metro", WEB, API, "America/Los_Angeles")
}

/// Context whose every request is answered by `mock`, without retries.
pub fn context(mock: &MockTransport, config: JurisdictionConfig) -> CrawlContext {
    let fetcher = Fetcher::new(Arc::new(mock.clone())).with_retry(RetryPolicy::once());
    CrawlContext::with_transport(config, Arc::new(mock.clone())).with_fetcher(fetcher)
}

pub fn web(path: &str) -> String {
    format!("{}/{}", WEB, path)
}

pub fn api(route: &str) -> String {
    format!("{}/{}", API, route)
}
