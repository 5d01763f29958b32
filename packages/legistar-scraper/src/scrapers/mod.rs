//! Scrapers for the web and REST interfaces.
//!
//! Web scrapers own a [`PostbackSession`](crate::session::PostbackSession)
//! per traversal; REST scrapers share the context's fetcher. Both borrow a
//! [`CrawlContext`].

pub mod bills_api;
pub mod bills_web;
pub mod events_api;
pub mod events_web;
pub mod people;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::CrawlContext;
use crate::error::{FetchError, Result};
use crate::paging::fetch_list;
use crate::traits::transport::HttpRequest;

pub use bills_api::{ApiBills, MATTER_SINCE_FIELDS};
pub use bills_web::{LegislationDetail, LegislationSearch, SearchBounds, WebVotes};
pub use events_api::{assemble_event, event_start, ApiEvents, EventCrawl, ReconciledEvent, EVENT_SINCE_FIELDS};
pub use events_web::{agenda, event_details, roll_call, WebCalendar};
pub use people::{ApiPeople, CouncilMember, CouncilMembers};

/// GET any REST route as raw JSON.
pub async fn endpoint(ctx: &CrawlContext, route: &str) -> Result<Value> {
    let url = ctx.config.api_url(route);
    let response = ctx.fetcher.fetch(HttpRequest::get(&url)).await?;
    if !response.is_success() {
        return Err(FetchError::Status {
            url,
            status: response.status,
        }
        .into());
    }
    Ok(response.json()?)
}

/// GET a REST list route and decode every element.
pub(crate) async fn get_list<T: DeserializeOwned>(ctx: &CrawlContext, request: HttpRequest) -> Result<Vec<T>> {
    fetch_list(&ctx.fetcher, request)
        .await?
        .into_iter()
        .map(|raw| serde_json::from_value(raw).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::http::{Fetcher, RetryPolicy};
    use crate::testing::{MockReply, MockTransport};
    use crate::types::config::JurisdictionConfig;
    use std::sync::Arc;

    fn context(mock: &MockTransport) -> CrawlContext {
        let config = JurisdictionConfig::new(
            "metro",
            "https://metro.legistar.com",
            "https://webapi.legistar.com/v1/metro",
            "America/Los_Angeles",
        );
        let fetcher = Fetcher::new(Arc::new(mock.clone())).with_retry(RetryPolicy::once());
        CrawlContext::with_transport(config, Arc::new(mock.clone())).with_fetcher(fetcher)
    }

    #[tokio::test]
    async fn test_endpoint_returns_raw_json() {
        let mock = MockTransport::new()
            .always_url(
                "https://webapi.legistar.com/v1/metro/mattertypes",
                MockReply::json(r#"[{"MatterTypeId": 1, "MatterTypeName": "Ordinance"}]"#),
            );
        let ctx = context(&mock);

        let value = endpoint(&ctx, "mattertypes").await.unwrap();
        assert_eq!(value[0]["MatterTypeName"], "Ordinance");

        // 404 is retried like any other unacceptable status.
        match endpoint(&ctx, "missing").await {
            Err(ScrapeError::Fetch(FetchError::RetriesExhausted { status, .. })) => assert_eq!(status, Some(404)),
            other => panic!("expected exhausted retries, got {:?}", other),
        }
    }
}
