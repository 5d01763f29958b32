//! Pairing REST events with web calendar rows.
//!
//! REST events arrive in modification order; the web calendar is
//! reverse-chronological. Rather than rescan the calendar for every REST
//! event, [`EventReconciler`] pulls calendar rows lazily, caching each by its
//! [`EventMatchKey`], and only pulls more on a cache miss. Across a whole
//! crawl the calendar is read at most once.

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::extract::table::ICALENDAR_KEY;
use crate::http::Fetcher;
use crate::ical::parse_dtstart;
use crate::traits::transport::HttpRequest;
use crate::types::api::ApiEvent;
use crate::types::config::JurisdictionConfig;
use crate::types::page::{FieldMap, TableRow, NOT_AVAILABLE};

/// Body name and local start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventMatchKey {
    pub body: String,
    pub start: DateTime<Tz>,
}

impl EventMatchKey {
    pub fn new(body: &str, start: DateTime<Tz>) -> Self {
        Self {
            body: body.trim().to_string(),
            start,
        }
    }
}

/// Lazy, finite sequence of web events.
#[async_trait]
pub trait WebEventSource: Send {
    type Item: Clone + Send + Sync;

    async fn next_event(&mut self) -> Result<Option<Self::Item>>;
}

/// Computes match keys.
#[async_trait]
pub trait EventKeyer<T: Sync>: Send + Sync {
    /// Key for `item`, or `None` when it cannot be keyed.
    async fn key(&self, item: &T) -> Result<Option<EventMatchKey>>;
}

/// Resumable cache-then-scan lookup over one web event source.
pub struct EventReconciler<S: WebEventSource, K> {
    source: S,
    keyer: K,
    cache: HashMap<EventMatchKey, S::Item>,
    exhausted: bool,
    scanned: usize,
}

impl<S, K> EventReconciler<S, K>
where
    S: WebEventSource,
    K: EventKeyer<S::Item>,
{
    pub fn new(source: S, keyer: K) -> Self {
        Self {
            source,
            keyer,
            cache: HashMap::new(),
            exhausted: false,
            scanned: 0,
        }
    }

    /// Web events pulled from the source so far.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The web event with `key`, pulling from the source until found or
    /// exhausted.
    pub async fn lookup(&mut self, key: &EventMatchKey) -> Result<Option<S::Item>> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(Some(hit.clone()));
        }

        while !self.exhausted {
            let Some(item) = self.source.next_event().await? else {
                debug!(scanned = self.scanned, "Web event source exhausted");
                self.exhausted = true;
                break;
            };
            self.scanned += 1;

            let item_key = match self.keyer.key(&item).await {
                Ok(Some(item_key)) => item_key,
                Ok(None) => {
                    debug!("Web event without a match key");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Could not key web event, skipping it");
                    continue;
                }
            };

            let found = item_key == *key;
            self.cache.entry(item_key).or_insert_with(|| item.clone());
            if found {
                return Ok(Some(item));
            }
        }

        Ok(None)
    }
}

/// Fetch a calendar attachment and read its start time.
pub async fn ical_start(fetcher: &Fetcher, url: &str, tz: Tz) -> Result<Option<DateTime<Tz>>> {
    let response = fetcher.fetch(HttpRequest::get(url)).await?;
    if !response.is_success() {
        warn!(url = %url, status = response.status, "Calendar attachment unavailable");
        return Ok(None);
    }
    let start = parse_dtstart(&response.body, tz);
    if start.is_none() {
        warn!(url = %url, "Calendar attachment has no DTSTART");
    }
    Ok(start)
}

/// Keys web calendar rows by body name and their attachment's start.
pub struct CalendarRowKeyer<'f> {
    fetcher: &'f Fetcher,
    tz: Tz,
    body_label: String,
    not_available: Vec<String>,
}

impl<'f> CalendarRowKeyer<'f> {
    pub fn new(fetcher: &'f Fetcher, tz: Tz, body_label: impl Into<String>) -> Self {
        Self {
            fetcher,
            tz,
            body_label: body_label.into(),
            not_available: NOT_AVAILABLE.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Texts the deployment renders for a missing body name.
    pub fn with_not_available(mut self, not_available: Vec<String>) -> Self {
        self.not_available = not_available;
        self
    }
}

#[async_trait]
impl<'f> EventKeyer<TableRow> for CalendarRowKeyer<'f> {
    async fn key(&self, row: &TableRow) -> Result<Option<EventMatchKey>> {
        let Some(body) = row.text_among(&self.body_label, &self.not_available) else {
            return Ok(None);
        };
        let Some(url) = row.present(ICALENDAR_KEY).and_then(|v| v.url()).map(str::to_string) else {
            return Ok(None);
        };
        let start = ical_start(self.fetcher, &url, self.tz).await?;
        Ok(start.map(|start| EventMatchKey::new(&body, start)))
    }
}

/// Calendar attachment URL of a REST event.
pub fn api_ical_url(config: &JurisdictionConfig, event: &ApiEvent) -> String {
    format!(
        "{}?M=IC&ID={}&GUID={}",
        config.web_url("View.ashx"),
        event.event_id,
        event.event_guid.as_deref().unwrap_or_default()
    )
}

/// Keys REST events by body name and their own attachment's start.
pub struct ApiEventKeyer<'f> {
    fetcher: &'f Fetcher,
    config: &'f JurisdictionConfig,
    tz: Tz,
}

impl<'f> ApiEventKeyer<'f> {
    pub fn new(fetcher: &'f Fetcher, config: &'f JurisdictionConfig, tz: Tz) -> Self {
        Self { fetcher, config, tz }
    }
}

#[async_trait]
impl<'f> EventKeyer<ApiEvent> for ApiEventKeyer<'f> {
    async fn key(&self, event: &ApiEvent) -> Result<Option<EventMatchKey>> {
        let url = api_ical_url(self.config, event);
        let start = ical_start(self.fetcher, &url, self.tz).await?;
        Ok(start.map(|start| EventMatchKey::new(&event.event_body_name, start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::VecDeque;

    const TZ: Tz = chrono_tz::America::Chicago;

    fn key(body: &str, day: u32) -> EventMatchKey {
        EventMatchKey::new(body, TZ.with_ymd_and_hms(2020, 1, day, 18, 0, 0).unwrap())
    }

    struct VecSource {
        items: VecDeque<(String, u32)>,
    }

    #[async_trait]
    impl WebEventSource for VecSource {
        type Item = (String, u32);

        async fn next_event(&mut self) -> Result<Option<Self::Item>> {
            Ok(self.items.pop_front())
        }
    }

    struct TupleKeyer;

    #[async_trait]
    impl EventKeyer<(String, u32)> for TupleKeyer {
        async fn key(&self, item: &(String, u32)) -> Result<Option<EventMatchKey>> {
            Ok(Some(key(&item.0, item.1)))
        }
    }

    fn reconciler(items: &[(&str, u32)]) -> EventReconciler<VecSource, TupleKeyer> {
        let items = items.iter().map(|(b, d)| (b.to_string(), *d)).collect();
        EventReconciler::new(VecSource { items }, TupleKeyer)
    }

    #[tokio::test]
    async fn test_orders_differ_and_scan_is_shared() {
        let mut reconciler = reconciler(&[("B", 2), ("A", 1)]);

        let a = reconciler.lookup(&key("A", 1)).await.unwrap();
        assert_eq!(a, Some(("A".to_string(), 1)));
        assert_eq!(reconciler.scanned(), 2);

        let b = reconciler.lookup(&key("B", 2)).await.unwrap();
        assert_eq!(b, Some(("B".to_string(), 2)));
        assert_eq!(reconciler.scanned(), 2);
    }

    #[tokio::test]
    async fn test_miss_exhausts_once() {
        let mut reconciler = reconciler(&[("A", 1), ("B", 2)]);

        assert_eq!(reconciler.lookup(&key("C", 3)).await.unwrap(), None);
        assert!(reconciler.is_exhausted());
        assert_eq!(reconciler.scanned(), 2);

        assert_eq!(reconciler.lookup(&key("C", 3)).await.unwrap(), None);
        assert_eq!(reconciler.scanned(), 2);
        assert!(reconciler.lookup(&key("A", 1)).await.unwrap().is_some());
    }

    #[test]
    fn test_body_name_is_trimmed() {
        assert_eq!(key(" City Council ", 1), key("City Council", 1));
    }
}
