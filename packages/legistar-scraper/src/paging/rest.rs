//! REST pagination and incremental filters.

use chrono::{Duration, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::marker::PhantomData;
use tracing::{debug, info};

use super::seen::SeenWindow;
use crate::error::{FetchError, Result, ScrapeError};
use crate::http::Fetcher;
use crate::traits::transport::HttpRequest;

/// Records per REST page; the server's fixed maximum.
pub const PAGE_SIZE: usize = 1000;

/// `"{field} gt datetime'{since}'"` for every field, joined with `or`.
///
/// A record is revisited when any tracked timestamp advanced.
pub fn since_filter(fields: &[&str], since: NaiveDateTime) -> String {
    let stamp = since.format("%Y-%m-%dT%H:%M:%S");
    fields
        .iter()
        .map(|field| format!("{} gt datetime'{}'", field, stamp))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Incremental query bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// Only records changed after this local time; everything when `None`.
    pub since: Option<NaiveDateTime>,
    /// Subtracted from `since` before filtering.
    pub look_back: Duration,
}

impl Default for SearchWindow {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SearchWindow {
    pub fn new(since: Option<NaiveDateTime>) -> Self {
        Self {
            since,
            look_back: Duration::zero(),
        }
    }

    pub fn with_look_back_hours(mut self, hours: i64) -> Self {
        self.look_back = Duration::hours(hours);
        self
    }

    pub fn effective_since(&self) -> Option<NaiveDateTime> {
        self.since.map(|since| since - self.look_back)
    }

    /// Filter over `fields`, if there is a lower bound.
    pub fn filter(&self, fields: &[&str]) -> Option<String> {
        self.effective_since().map(|since| since_filter(fields, since))
    }
}

/// Lazy cursor over every record of a REST collection.
///
/// Requests `$skip = n * 1000` until a page comes back short. Records whose
/// id field was seen in the last 1000 are dropped.
pub struct RestPager<'f, T> {
    fetcher: &'f Fetcher,
    url: String,
    params: Vec<(String, String)>,
    key_field: String,
    page_index: usize,
    buffer: VecDeque<Value>,
    seen: SeenWindow<i64>,
    exhausted: bool,
    _record: PhantomData<fn() -> T>,
}

impl<'f, T: DeserializeOwned> RestPager<'f, T> {
    /// Page `url`, de-duplicating on the integer field `key_field`.
    pub fn new(fetcher: &'f Fetcher, url: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            params: Vec::new(),
            key_field: key_field.into(),
            page_index: 0,
            buffer: VecDeque::new(),
            seen: SeenWindow::new(PAGE_SIZE),
            exhausted: false,
            _record: PhantomData,
        }
    }

    pub fn with_filter(self, filter: Option<String>) -> Self {
        match filter {
            Some(filter) => self.with_param("$filter", filter),
            None => self,
        }
    }

    pub fn with_orderby(self, orderby: impl Into<String>) -> Self {
        self.with_param("$orderby", orderby)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Next record, fetching pages as needed.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                return Ok(Some(serde_json::from_value(raw)?));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drain the cursor.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let mut request = HttpRequest::get(&self.url);
        for (key, value) in &self.params {
            request = request.with_query(key, value);
        }
        let skip = self.page_index * PAGE_SIZE;
        request = request.with_query("$skip", skip.to_string());

        let page = match fetch_list(self.fetcher, request).await {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        debug!(url = %self.url, skip, count = page.len(), "REST page");
        if page.len() < PAGE_SIZE {
            self.exhausted = true;
        }
        self.page_index += 1;

        for record in page {
            match record.get(&self.key_field).and_then(Value::as_i64) {
                Some(key) if !self.seen.insert(key) => {
                    debug!(url = %self.url, key, "Skipping record repeated across pages");
                }
                _ => self.buffer.push_back(record),
            }
        }
        Ok(())
    }
}

/// GET a JSON list. 400 becomes [`ScrapeError::BadQuery`]; 410 an empty list.
pub async fn fetch_list(fetcher: &Fetcher, request: HttpRequest) -> Result<Vec<Value>> {
    let url = request.display_url();
    let response = fetcher.fetch(request).await?;

    match response.status {
        400 => {
            let message = serde_json::from_str::<Value>(&response.body)
                .ok()
                .and_then(|v| v.get("Message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| response.body.clone());
            Err(ScrapeError::BadQuery { message })
        }
        410 => {
            info!(url = %url, "Collection gone");
            Ok(Vec::new())
        }
        s if !(200..300).contains(&s) => Err(FetchError::Status { url, status: s }.into()),
        _ => Ok(serde_json::from_str(&response.body)?),
    }
}
