//! Paging through web interface result grids.
//!
//! ```text
//! Initial --first page--> PagingActive --next link--> PagingActive
//!                                      --no link----> Done
//! ```
//!
//! The pager locates the link after the "current page" marker, reads the
//! postback target out of it and posts it back with the session tokens.

use scraper::{ElementRef, Selector};
use std::sync::LazyLock;
use tracing::debug;

use crate::error::Result;
use crate::extract::links::postback_target;
use crate::extract::table::{extract_table, TableExtraction};
use crate::session::{PostbackSession, EVENT_TARGET};
use crate::traits::transport::Form;
use crate::types::page::Page;

static CURRENT_PAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.rgCurrentPage").expect("static selector"));

/// Search button key; submitting it again would restart the search.
pub const SEARCH_BUTTON: &str = "ctl00$ContentPlaceHolder1$btnSearch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerState {
    Initial,
    PagingActive,
    Done,
}

enum Start {
    Get,
    Submit,
    Prefetched(Page),
}

/// Lazy, finite, non-restartable sequence of result pages.
///
/// Holds only paging state; each call borrows the session, so one session
/// can drive several pagers in turn.
pub struct HtmlPager {
    url: String,
    payload: Form,
    submit_button: Option<String>,
    state: PagerState,
    start: Option<Start>,
    current: Option<Page>,
}

impl HtmlPager {
    fn build(url: &str, payload: Form, start: Start) -> Self {
        Self {
            url: url.to_string(),
            payload,
            submit_button: Some(SEARCH_BUTTON.to_string()),
            state: PagerState::Initial,
            start: Some(start),
            current: None,
        }
    }

    /// First page is a plain GET of `url`.
    pub fn get(url: &str) -> Self {
        Self::build(url, Form::new(), Start::Get)
    }

    /// First page is the response to posting `payload`. The payload is
    /// re-sent with every page so selections persist.
    pub fn submit(url: &str, payload: Form) -> Self {
        Self::build(url, payload, Start::Submit)
    }

    /// First page was already fetched by the caller. Its tokens replace the
    /// session's when paging starts.
    pub fn prefetched(url: &str, payload: Form, page: Page) -> Self {
        Self::build(url, payload, Start::Prefetched(page))
    }

    /// Key dropped from the payload after the first page.
    pub fn with_submit_button(mut self, key: Option<String>) -> Self {
        self.submit_button = key;
        self
    }

    pub fn state(&self) -> PagerState {
        self.state
    }

    /// The next page, or `None` once the last page has been returned.
    pub async fn next_page(&mut self, session: &mut PostbackSession<'_>) -> Result<Option<Page>> {
        let result = self.advance(session).await;
        if result.is_err() {
            self.state = PagerState::Done;
        }
        result
    }

    async fn advance(&mut self, session: &mut PostbackSession<'_>) -> Result<Option<Page>> {
        let page = match self.state {
            PagerState::Done => return Ok(None),
            PagerState::Initial => {
                let page = match self.start.take() {
                    Some(Start::Prefetched(page)) => {
                        session.adopt(&page);
                        page
                    }
                    Some(Start::Submit) => session.post(&self.url, self.payload.clone()).await?,
                    Some(Start::Get) | None => session.get(&self.url).await?,
                };
                if let Some(button) = &self.submit_button {
                    self.payload.shift_remove(button);
                }
                self.state = PagerState::PagingActive;
                page
            }
            PagerState::PagingActive => {
                let target = self.current.as_ref().and_then(next_page_target);
                let Some(target) = target else {
                    debug!(url = %self.url, "No next page link");
                    self.state = PagerState::Done;
                    self.current = None;
                    return Ok(None);
                };

                debug!(url = %self.url, target = %target, "Requesting next page");
                let mut payload = self.payload.clone();
                payload.insert(EVENT_TARGET.to_string(), target);
                session.post(&self.url, payload).await?
            }
        };

        self.current = Some(page.clone());
        Ok(Some(page))
    }

    /// The next page's grid.
    pub async fn next_grid(
        &mut self,
        session: &mut PostbackSession<'_>,
        table_id: &str,
        no_records_marker: &str,
    ) -> Result<Option<TableExtraction>> {
        match self.next_page(session).await? {
            Some(page) => extract_table(&page, table_id, no_records_marker).map(Some),
            None => Ok(None),
        }
    }
}

/// Postback target of the pager link following the current page marker.
pub fn next_page_target(page: &Page) -> Option<String> {
    let document = page.document();
    let current = document.select(&CURRENT_PAGE).next()?;
    current
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "a")
        .and_then(postback_target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Fetcher, RetryPolicy};
    use crate::testing::{fixtures, MockReply, MockTransport};
    use std::sync::Arc;

    const URL: &str = "https://metro.legistar.com/Legislation.aspx";

    fn grid_page(view_state: &str, names: &[&str], next: Option<&str>, current: usize) -> String {
        let rows: Vec<Vec<String>> = names.iter().map(|n| vec![n.to_string()]).collect();
        fixtures::form_page(
            view_state,
            Some("E"),
            &fixtures::grid("grid", &["File #"], &rows, &fixtures::pager(current, next)),
        )
    }

    fn fetcher(mock: &MockTransport) -> Fetcher {
        Fetcher::new(Arc::new(mock.clone())).with_retry(RetryPolicy::once())
    }

    #[test]
    fn test_next_page_target() {
        let page = Page::new(URL, grid_page("V", &["a"], Some("ctl00$grid$ctl02"), 1));
        assert_eq!(next_page_target(&page).as_deref(), Some("ctl00$grid$ctl02"));

        let last = Page::new(URL, grid_page("V", &["a"], None, 3));
        assert_eq!(next_page_target(&last), None);
    }

    #[tokio::test]
    async fn test_pages_until_no_next_link() {
        let mock = MockTransport::new()
            .once_url(URL, MockReply::html(grid_page("V1", &["a", "b"], Some("p2"), 1)))
            .once_url(URL, MockReply::html(grid_page("V2", &["c"], Some("p3"), 2)))
            .once_url(URL, MockReply::html(grid_page("V3", &["d"], None, 3)));
        let fetcher = fetcher(&mock);
        let mut session = PostbackSession::new(&fetcher);

        let mut payload = Form::new();
        payload.insert("ctl00$ContentPlaceHolder1$txtSearch".into(), "zoning".into());
        payload.insert(SEARCH_BUTTON.into(), "Search Legislation".into());
        let mut pager = HtmlPager::submit(URL, payload);
        assert_eq!(pager.state(), PagerState::Initial);

        let mut files = Vec::new();
        while let Some(grid) = pager
            .next_grid(&mut session, "grid", "No records to display.")
            .await
            .unwrap()
        {
            files.extend(grid.rows.iter().map(|r| r["File #"].label()));
        }
        assert_eq!(files, vec!["a", "b", "c", "d"]);
        assert_eq!(pager.state(), PagerState::Done);
        assert!(pager.next_page(&mut session).await.unwrap().is_none());

        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        let first = calls[0].form.as_ref().unwrap();
        assert!(first.contains_key(SEARCH_BUTTON));
        let second = calls[1].form.as_ref().unwrap();
        assert!(!second.contains_key(SEARCH_BUTTON));
        assert_eq!(second[EVENT_TARGET], "p2");
        assert_eq!(second["__VIEWSTATE"], "V1");
        assert_eq!(second["ctl00$ContentPlaceHolder1$txtSearch"], "zoning");
        assert_eq!(calls[2].form.as_ref().unwrap()["__VIEWSTATE"], "V2");
    }

    #[tokio::test]
    async fn test_prefetched_first_page_skips_request() {
        let mock = MockTransport::new();
        let fetcher = fetcher(&mock);
        let mut session = PostbackSession::new(&fetcher);

        let page = Page::new(URL, grid_page("V1", &["a"], None, 1));
        let mut pager = HtmlPager::prefetched(URL, Form::new(), page);
        assert!(pager.next_page(&mut session).await.unwrap().is_some());
        assert!(pager.next_page(&mut session).await.unwrap().is_none());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prefetched_page_tokens_feed_the_next_post() {
        let other = "https://metro.legistar.com/Calendar.aspx";
        let mock = MockTransport::new()
            .once_url(other, MockReply::html(grid_page("V9", &["x"], None, 1)))
            .once_url(URL, MockReply::html(grid_page("V2", &["b"], None, 2)));
        let fetcher = fetcher(&mock);
        let mut session = PostbackSession::new(&fetcher);
        session.get(other).await.unwrap();

        let page = Page::new(URL, grid_page("V1", &["a"], Some("p2"), 1));
        let mut pager = HtmlPager::prefetched(URL, Form::new(), page);
        assert!(pager.next_page(&mut session).await.unwrap().is_some());
        assert_eq!(session.tokens().view_state.as_deref(), Some("V1"));
        assert!(pager.next_page(&mut session).await.unwrap().is_some());

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        let next = calls[1].form.as_ref().unwrap();
        assert_eq!(next[EVENT_TARGET], "p2");
        assert_eq!(next["__VIEWSTATE"], "V1");
    }

    #[tokio::test]
    async fn test_error_ends_sequence() {
        let mock = MockTransport::new().always_url(URL, MockReply::status(503, ""));
        let fetcher = fetcher(&mock);
        let mut session = PostbackSession::new(&fetcher);

        let mut pager = HtmlPager::get(URL);
        assert!(pager.next_page(&mut session).await.is_err());
        assert_eq!(pager.state(), PagerState::Done);
        assert!(pager.next_page(&mut session).await.unwrap().is_none());
    }
}
