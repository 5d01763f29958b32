//! Legislation search, detail pages and action votes on the web interface.

use chrono::NaiveDate;
use scraper::Selector;
use std::collections::VecDeque;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use crate::context::CrawlContext;
use crate::error::{Result, ScrapeError};
use crate::extract::detail::page_details;
use crate::extract::table::extract_table;
use crate::paging::{HtmlPager, SeenWindow};
use crate::session::{PostbackSession, RangeSelector};
use crate::traits::transport::Form;
use crate::types::page::{DetailRecord, FieldValue, Link, Page, TableRow};
use crate::types::records::Ballot;

pub const SEARCH_GRID: &str = "ctl00_ContentPlaceHolder1_gridMain_ctl00";
pub const DETAIL_DIV: &str = "ctl00_ContentPlaceHolder1_pageDetails";
pub const HISTORY_GRID: &str = "ctl00_ContentPlaceHolder1_gridLegislation_ctl00";
pub const TEXT_DIV: &str = "ctl00_ContentPlaceHolder1_divText";
pub const VOTE_GRID: &str = "ctl00_ContentPlaceHolder1_gridVote_ctl00";
pub const ACTION_DETAIL_DIV: &str = "ctl00_ContentPlaceHolder1_pageTop1";

const SWITCH_BUTTON_ID: &str = "ctl00_ContentPlaceHolder1_btnSwitch";
const SEARCH_TEXT: &str = "ctl00$ContentPlaceHolder1$txtText";
const SEARCH_BUTTON_TEXT: &str = "Search Legislation";
const MAX_RESULTS_STATE: &str = "ctl00_ContentPlaceHolder1_lstMax_ClientState";
const MAX_RESULTS: &str = "1000000";
const CREATED_MODE: &str = "ctl00$ContentPlaceHolder1$radFileCreated";
const CREATED_FIRST: &str = "ctl00_ContentPlaceHolder1_txtFileCreated1";
const CREATED_SECOND: &str = "ctl00_ContentPlaceHolder1_txtFileCreated2";

static SWITCH_BUTTON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(&format!("input[id='{}']", SWITCH_BUTTON_ID)).expect("static selector")
});

/// Year selector of the advanced search form.
pub fn advanced_years() -> RangeSelector {
    RangeSelector {
        client_state_field: "ctl00_ContentPlaceHolder1_lstYearsAdvanced_ClientState".to_string(),
        input_id: "ctl00_ContentPlaceHolder1_lstYearsAdvanced_Input".to_string(),
    }
}

/// File-created date bounds of a legislation search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchBounds {
    pub created_after: Option<NaiveDate>,
    pub created_before: Option<NaiveDate>,
}

impl SearchBounds {
    fn apply(&self, payload: &mut Form) {
        let (mode, first, second) = match (self.created_after, self.created_before) {
            (Some(after), Some(before)) => ("between", after, Some(before)),
            (Some(after), None) => (">", after, None),
            (None, Some(before)) => ("<", before, None),
            (None, None) => return,
        };
        payload.insert(CREATED_MODE.to_string(), mode.to_string());
        date_input(payload, CREATED_FIRST, first);
        if let Some(second) = second {
            date_input(payload, CREATED_SECOND, second);
        }
    }
}

fn date_input(payload: &mut Form, control: &str, date: NaiveDate) {
    let stamp = date.format("%Y-%m-%d-00-00-00").to_string();
    let shown = date.format("%-m/%-d/%Y").to_string();
    let state = serde_json::json!({
        "enabled": true,
        "emptyMessage": "",
        "validationText": stamp,
        "valueAsString": stamp,
        "minDateStr": "1980-01-01-00-00-00",
        "maxDateStr": "2099-12-31-00-00-00",
        "lastSetTextBoxValue": shown,
    });
    payload.insert(format!("{}_dateInput_ClientState", control), state.to_string());
    payload.insert(control.replace('_', "$"), shown);
}

/// Detail URL with display options removed and full text requested.
pub fn canonical_detail_url(url: &str) -> String {
    let base = url.split("&Options").next().unwrap_or(url);
    format!("{}&FullText=1", base)
}

/// Name and value of the search mode switch.
fn switch_button(page: &Page) -> Result<(String, String)> {
    let document = page.document();
    let button = document
        .select(&SWITCH_BUTTON)
        .next()
        .ok_or_else(|| ScrapeError::missing("search switch button", &page.url))?;
    let el = button.value();
    Ok((
        el.attr("name").unwrap_or_default().to_string(),
        el.attr("value").unwrap_or_default().to_string(),
    ))
}

fn is_advanced(switch_value: &str) -> bool {
    switch_value.to_lowercase().contains("simple search")
}

/// Rewrite the id column to its label and attach the canonical detail URL.
/// Rows whose first column is not a link are not results.
fn search_result(mut row: TableRow, headers: &[String]) -> Option<(String, TableRow)> {
    let id_key = headers.first()?;
    let link = row.get(id_key)?.as_link()?.clone();
    let url = canonical_detail_url(&link.url);

    row.insert(id_key.clone(), FieldValue::Text(link.label.clone()));
    row.insert("url".to_string(), FieldValue::Link(Link::new(link.label, url.clone())));
    Some((url, row))
}

/// Advanced legislation search results.
pub struct LegislationSearch<'c> {
    ctx: &'c CrawlContext,
    session: PostbackSession<'c>,
    text: String,
    bounds: SearchBounds,
    pager: Option<HtmlPager>,
    rows: VecDeque<TableRow>,
    seen: SeenWindow<String>,
    done: bool,
}

impl<'c> LegislationSearch<'c> {
    pub fn new(ctx: &'c CrawlContext, text: impl Into<String>) -> Self {
        Self {
            ctx,
            session: ctx.session().with_range_selector(advanced_years()),
            text: text.into(),
            bounds: SearchBounds::default(),
            pager: None,
            rows: VecDeque::new(),
            seen: SeenWindow::new(10),
            done: false,
        }
    }

    pub fn with_bounds(mut self, bounds: SearchBounds) -> Self {
        self.bounds = bounds;
        self
    }

    fn payload(&self) -> Form {
        let mut payload = Form::new();
        payload.insert(SEARCH_TEXT.to_string(), self.text.clone());
        self.bounds.apply(&mut payload);
        payload.insert(
            MAX_RESULTS_STATE.to_string(),
            RangeSelector::client_state(MAX_RESULTS),
        );
        payload.insert(
            advanced_years().client_state_field,
            RangeSelector::client_state("All"),
        );
        payload.insert(crate::paging::SEARCH_BUTTON.to_string(), SEARCH_BUTTON_TEXT.to_string());
        payload
    }

    /// Load the search page, switching to the advanced form if needed.
    async fn open(&mut self) -> Result<()> {
        let url = self.ctx.config.legislation_url();
        let page = self.session.get(&url).await?;
        let (name, value) = switch_button(&page)?;

        if !is_advanced(&value) {
            debug!(url = %url, "Switching to advanced search");
            let mut payload = Form::new();
            payload.insert(name, value);
            let page = self.session.post(&url, payload).await?;
            let (_, value) = switch_button(&page)?;
            if !is_advanced(&value) {
                return Err(ScrapeError::missing("advanced search form", url));
            }
        }

        self.pager = Some(HtmlPager::submit(&url, self.payload()));
        Ok(())
    }

    /// Next result row, with `url` set to the canonical detail page.
    pub async fn next(&mut self) -> Result<Option<TableRow>> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                return Ok(Some(row));
            }
            if self.done {
                return Ok(None);
            }
            if self.pager.is_none() {
                if let Err(e) = self.open().await {
                    self.done = true;
                    return Err(e);
                }
            }

            let marker = &self.ctx.config.no_records_marker;
            let Some(pager) = self.pager.as_mut() else {
                continue;
            };
            let Some(grid) = pager.next_grid(&mut self.session, SEARCH_GRID, marker).await? else {
                self.done = true;
                continue;
            };

            for row in grid.rows {
                let Some((url, row)) = search_result(row, &grid.headers) else {
                    continue;
                };
                if self.seen.insert(url.clone()) {
                    self.rows.push_back(row);
                } else {
                    debug!(url = %url, "Skipping repeated search result");
                }
            }
        }
    }
}

/// A fetched legislation detail page.
pub struct LegislationDetail<'c> {
    ctx: &'c CrawlContext,
    page: Page,
}

impl<'c> LegislationDetail<'c> {
    pub async fn fetch(ctx: &'c CrawlContext, url: &str) -> Result<Self> {
        let page = ctx.session().get(url).await?;
        Ok(Self::from_page(ctx, page))
    }

    pub fn from_page(ctx: &'c CrawlContext, page: Page) -> Self {
        Self { ctx, page }
    }

    pub fn url(&self) -> &str {
        &self.page.url
    }

    /// Detail fields.
    pub fn fields(&self) -> Result<DetailRecord> {
        page_details(&self.page, DETAIL_DIV, self.ctx.hooks.field_extractor())
    }

    /// Action history ordered by date, then action id.
    pub fn history(&self) -> Result<Vec<TableRow>> {
        let grid = extract_table(&self.page, HISTORY_GRID, &self.ctx.config.no_records_marker)?;
        let ctx = self.ctx;

        let mut rows = grid.rows;
        rows.sort_by_key(|row| {
            let date = ctx
                .field_text(row, "action.date")
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%m/%d/%Y").ok());
            let id = ctx.field(row, "action.details").and_then(|v| v.url()).and_then(action_id);
            (date, id)
        });
        Ok(rows)
    }

    /// Full text markup, if the page shows it.
    pub fn text(&self) -> Option<String> {
        let document = self.page.document();
        let selector = Selector::parse(&format!("div[id='{}']", TEXT_DIV)).ok()?;
        document.select(&selector).next().map(|div| div.html())
    }
}

/// `ID` query parameter of an action detail link.
fn action_id(url: &str) -> Option<i64> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("ID"))
        .and_then(|(_, value)| value.parse().ok())
}

/// Result and ballots of one action's vote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebVotes {
    pub result: Option<String>,
    pub ballots: Vec<Ballot>,
}

impl WebVotes {
    /// Fetch an action detail page and read its vote.
    pub async fn fetch(ctx: &CrawlContext, action_url: &str) -> Result<Self> {
        let page = ctx.session().get(action_url).await?;
        Self::from_page(ctx, &page)
    }

    /// Normalized result and ballots; empty when the page has no vote grid.
    pub fn from_page(ctx: &CrawlContext, page: &Page) -> Result<Self> {
        let grid = match extract_table(page, VOTE_GRID, &ctx.config.no_records_marker) {
            Ok(grid) => grid,
            Err(ScrapeError::MissingStructure { .. }) => {
                warn!(url = %page.url, "No votes found in table");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };

        let options = ctx.vote_options();
        let value_label = ctx.label("vote.value");
        let ballots = grid
            .rows
            .iter()
            .filter_map(|row| {
                Some(Ballot {
                    voter: ctx.field_text(row, "person.name")?,
                    option: options.normalize(&row.get(value_label).map(|v| v.label()).unwrap_or_default()),
                })
            })
            .collect();

        let details = page_details(page, ACTION_DETAIL_DIV, ctx.hooks.field_extractor())?;
        let result = ctx
            .field_text(&details, "vote.result")
            .map(|raw| options.normalize(&raw));

        Ok(Self { result, ballots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Fetcher, RetryPolicy};
    use crate::testing::{fixtures, MockReply, MockTransport};
    use crate::traits::transport::HttpRequest;
    use crate::types::config::JurisdictionConfig;
    use crate::types::page::FieldMap;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const SEARCH: &str = "https://metro.legistar.com/Legislation.aspx";

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

    fn switch(value: &str) -> String {
        format!(
            r#"<input type="submit" id="{}" name="ctl00$ContentPlaceHolder1$btnSwitch" value="{}" />"#,
            SWITCH_BUTTON_ID, value
        )
    }

    fn results(view_state: &str, files: &[u32], next: Option<&str>, current: usize) -> String {
        let rows: Vec<Vec<String>> = files
            .iter()
            .map(|id| {
                vec![
                    format!(
                        r#"<a href="LegislationDetail.aspx?ID={id}&amp;GUID=G&amp;Options=ID|Text|&amp;Search=">20-{id}</a>"#
                    ),
                    "Ordinance".to_string(),
                ]
            })
            .collect();
        let inner = format!(
            "{}{}{}",
            switch("Simple search"),
            r#"<input id="ctl00_ContentPlaceHolder1_lstYearsAdvanced_Input" type="text" value="All Years" />"#,
            fixtures::grid(SEARCH_GRID, &["File #", "Type"], &rows, &fixtures::pager(current, next))
        );
        fixtures::form_page(view_state, Some("E"), &inner)
    }

    #[test]
    fn test_canonical_detail_url() {
        assert_eq!(
            canonical_detail_url("https://x.legistar.com/LegislationDetail.aspx?ID=1&GUID=G&Options=ID|Text|&Search="),
            "https://x.legistar.com/LegislationDetail.aspx?ID=1&GUID=G&FullText=1"
        );
    }

    #[test]
    fn test_bounds_payload() {
        let mut payload = Form::new();
        SearchBounds {
            created_after: NaiveDate::from_ymd_opt(2020, 1, 2),
            created_before: None,
        }
        .apply(&mut payload);
        assert_eq!(payload[CREATED_MODE], ">");
        assert_eq!(payload["ctl00$ContentPlaceHolder1$txtFileCreated1"], "1/2/2020");
        assert!(payload["ctl00_ContentPlaceHolder1_txtFileCreated1_dateInput_ClientState"]
            .contains("2020-01-02-00-00-00"));
    }

    #[tokio::test]
    async fn test_search_switches_to_advanced_and_pages() {
        let simple = fixtures::form_page("V0", Some("E"), &switch("Detailed search"));
        let advanced = fixtures::form_page("V1", Some("E"), &switch("Simple search"));
        let mock = MockTransport::new()
            .once_when(|r: &HttpRequest| r.form.is_none(), MockReply::html(simple))
            .once_when(
                |r: &HttpRequest| r.form.as_ref().is_some_and(|f| f.contains_key("ctl00$ContentPlaceHolder1$btnSwitch")),
                MockReply::html(advanced),
            )
            .once_url(SEARCH, MockReply::html(results("V2", &[3, 2, 1], Some("p2"), 1)))
            .once_url(SEARCH, MockReply::html(results("V3", &[1, 0], None, 2)));
        let ctx = context(&mock);

        let mut search = LegislationSearch::new(&ctx, "zoning");
        let mut files = Vec::new();
        while let Some(row) = search.next().await.unwrap() {
            files.push(row.text_of("File #").unwrap());
            assert!(row["url"].url().unwrap().ends_with("&GUID=G&FullText=1"));
        }
        assert_eq!(files, vec!["20-3", "20-2", "20-1", "20-0"]);

        let calls = mock.calls();
        assert_eq!(calls.len(), 4);
        let search_post = calls[2].form.as_ref().unwrap();
        assert_eq!(search_post[SEARCH_TEXT], "zoning");
        assert_eq!(search_post[MAX_RESULTS_STATE], r#"{"value":"1000000"}"#);
        assert_eq!(search_post["__VIEWSTATE"], "V1");
    }

    #[tokio::test]
    async fn test_full_text_quoting_the_deletion_phrase_is_live() {
        let url = "https://metro.legistar.com/LegislationDetail.aspx?ID=5&GUID=G&FullText=1";
        let text = format!(
            r#"<div id="{}"><p>WHEREAS the Lakeside Sanitary District no longer exists as a taxing body;</p>
<p>WHEREAS the clerk's search returned "This record no longer exists";</p></div>"#,
            TEXT_DIV
        );
        let mock = MockTransport::new().always_url(url, MockReply::html(fixtures::form_page("V", None, &text)));
        let ctx = context(&mock);

        let detail = LegislationDetail::fetch(&ctx, url).await.unwrap();
        assert!(detail.text().unwrap().contains("taxing body"));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_history_sorted_by_date_then_action_id() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        let row = |date: &str, id: u32, action: &str| {
            vec![
                date.to_string(),
                action.to_string(),
                format!(r#"<a href="HistoryDetail.aspx?ID={id}&amp;GUID=G">Action details</a>"#),
            ]
        };
        let grid = fixtures::grid(
            HISTORY_GRID,
            &["Date", "Action", "Action\u{a0}Details"],
            &[
                row("2/3/2020", 9, "Passed"),
                row("1/2/2020", 12, "Referred"),
                row("1/2/2020", 10, "Introduced"),
            ],
            "",
        );
        let page = Page::new(
            "https://metro.legistar.com/LegislationDetail.aspx?ID=5",
            fixtures::form_page("V", None, &format!("{}<div id=\"{}\"><p>Be it ordained</p></div>", grid, TEXT_DIV)),
        );
        let detail = LegislationDetail::from_page(&ctx, page);

        let actions: Vec<String> = detail
            .history()
            .unwrap()
            .iter()
            .map(|r| r.text_of("Action").unwrap())
            .collect();
        assert_eq!(actions, vec!["Introduced", "Referred", "Passed"]);
        assert!(detail.text().unwrap().contains("Be it ordained"));
    }

    #[test]
    fn test_votes_from_action_page() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        let grid = fixtures::grid(
            VOTE_GRID,
            &["Person Name", "Vote"],
            &[
                vec![r#"<a href="PersonDetail.aspx?ID=1">Ada</a>"#.into(), "Aye".into()],
                vec![r#"<a href="PersonDetail.aspx?ID=2">Bo</a>"#.into(), "Nay".into()],
            ],
            "",
        );
        let top = fixtures::detail_div(ACTION_DETAIL_DIV, &[("Result", "Result", "Pass")]);
        let page = Page::new(
            "https://metro.legistar.com/HistoryDetail.aspx?ID=9",
            fixtures::form_page("V", None, &format!("{}{}", top, grid)),
        );

        let votes = WebVotes::from_page(&ctx, &page).unwrap();
        assert_eq!(votes.result.as_deref(), Some("pass"));
        assert_eq!(
            votes.ballots,
            vec![
                Ballot { voter: "Ada".into(), option: "yes".into() },
                Ballot { voter: "Bo".into(), option: "no".into() },
            ]
        );

        let empty = Page::new("https://metro.legistar.com/HistoryDetail.aspx?ID=10", fixtures::form_page("V", None, &top));
        assert_eq!(WebVotes::from_page(&ctx, &empty).unwrap(), WebVotes::default());
    }

    #[test]
    fn test_deployment_missing_value_text_is_blank() {
        let mock = MockTransport::new();
        let config = JurisdictionConfig::new(
            "metro",
            "https://metro.legistar.com",
            "https://webapi.legistar.com/v1/metro",
            "America/Los_Angeles",
        )
        .with_not_available("Pending");
        let ctx = CrawlContext::with_transport(config, Arc::new(mock.clone()))
            .with_fetcher(Fetcher::new(Arc::new(mock.clone())).with_retry(RetryPolicy::once()));

        let grid = fixtures::grid(
            VOTE_GRID,
            &["Person Name", "Vote"],
            &[
                vec!["Ada".into(), "Aye".into()],
                vec!["Pending".into(), "Nay".into()],
            ],
            "",
        );
        let top = fixtures::detail_div(ACTION_DETAIL_DIV, &[("Result", "Result", "Pending")]);
        let page = Page::new(
            "https://metro.legistar.com/HistoryDetail.aspx?ID=11",
            fixtures::form_page("V", None, &format!("{}{}", top, grid)),
        );

        let votes = WebVotes::from_page(&ctx, &page).unwrap();
        assert_eq!(votes.result, None);
        assert_eq!(votes.ballots, vec![Ballot { voter: "Ada".into(), option: "yes".into() }]);
    }
}
