//! Postback protocol: server-issued form tokens and response triage.
//!
//! Every HTML response carries hidden inputs the server expects back on the
//! next submission. [`PostbackSession`] captures them after each response
//! and merges them into each POST, and classifies responses so protocol
//! faults become retries or explicit absence.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::http::{Fetcher, Inspection};
use crate::traits::transport::{Form, HttpRequest, HttpResponse, Method};
use crate::types::page::Page;

pub const VIEWSTATE: &str = "__VIEWSTATE";
pub const EVENT_VALIDATION: &str = "__EVENTVALIDATION";
pub const EVENT_TARGET: &str = "__EVENTTARGET";
pub const EVENT_ARGUMENT: &str = "__EVENTARGUMENT";

/// Notice rendered in place of a deleted record.
pub const GONE_NOTICE: &str = "This record no longer exists";

/// Id fragments of containers holding record content. Text quoted there is
/// never the platform's own notice.
const CONTENT_CONTAINERS: [&str; 3] = ["divText", "pageDetails", "grid"];

static INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name]").expect("static selector"));

/// Postback tokens of the most recent form page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    pub view_state: Option<String>,
    pub event_validation: Option<String>,
    pub event_target: Option<String>,
    pub event_argument: Option<String>,
}

impl SessionTokens {
    /// Read the hidden token inputs. Any of them may be absent; older pages
    /// omit event validation.
    pub fn capture(document: &Html) -> Self {
        let mut tokens = Self::default();
        for input in document.select(&INPUT) {
            let el = input.value();
            let value = el.attr("value").unwrap_or_default().to_string();
            match el.attr("name") {
                Some(VIEWSTATE) => tokens.view_state = Some(value),
                Some(EVENT_VALIDATION) => tokens.event_validation = Some(value),
                Some(EVENT_TARGET) => tokens.event_target = Some(value),
                Some(EVENT_ARGUMENT) => tokens.event_argument = Some(value),
                _ => {}
            }
        }
        tokens
    }

    pub fn from_html(html: &str) -> Self {
        Self::capture(&Html::parse_document(html))
    }

    /// True when the page was a postback form at all.
    pub fn is_empty(&self) -> bool {
        self.view_state.is_none()
    }

    fn pairs(&self) -> [(&'static str, Option<&String>); 4] {
        [
            (VIEWSTATE, self.view_state.as_ref()),
            (EVENT_VALIDATION, self.event_validation.as_ref()),
            (EVENT_TARGET, self.event_target.as_ref()),
            (EVENT_ARGUMENT, self.event_argument.as_ref()),
        ]
    }

    /// Overlay the tokens under the payload: keys the caller already set win.
    /// Target and argument are always present, empty when unknown.
    pub fn merge(&self, payload: &mut Form) {
        for (key, value) in self.pairs() {
            match value {
                Some(v) => {
                    payload.entry(key.to_string()).or_insert_with(|| v.clone());
                }
                None if key == EVENT_TARGET || key == EVENT_ARGUMENT => {
                    payload.entry(key.to_string()).or_default();
                }
                None => {}
            }
        }
    }

    /// Replace whatever tokens the payload carries with these ones.
    pub fn overwrite(&self, payload: &mut Form) {
        for (key, value) in self.pairs() {
            if key == EVENT_TARGET {
                continue;
            }
            match value {
                Some(v) => {
                    payload.insert(key.to_string(), v.clone());
                }
                None => {
                    payload.shift_remove(key);
                }
            }
        }
    }
}

/// Time-range dropdown that sometimes resets to its default instead of the
/// requested value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSelector {
    /// Posted client-state field, JSON `{"value":"..."}`.
    pub client_state_field: String,
    /// Id of the text input that shows the selection on the returned page.
    pub input_id: String,
}

impl Default for RangeSelector {
    fn default() -> Self {
        Self {
            client_state_field: "ctl00_ContentPlaceHolder1_lstYears_ClientState".to_string(),
            input_id: "ctl00_ContentPlaceHolder1_lstYears_Input".to_string(),
        }
    }
}

impl RangeSelector {
    /// Client-state payload selecting `value`.
    pub fn client_state(value: &str) -> String {
        serde_json::json!({ "value": value }).to_string()
    }

    /// Value requested by a payload, if it touches this selector.
    pub fn requested(&self, payload: &Form) -> Option<String> {
        let raw = payload.get(&self.client_state_field)?;
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()?
            .get("value")?
            .as_str()
            .map(str::to_string)
    }

    /// Text the input shows when `value` is selected.
    pub fn displayed(value: &str) -> String {
        if value == "All" {
            "All Years".to_string()
        } else {
            value.to_string()
        }
    }

    /// Value shown by the returned page.
    pub fn returned(&self, document: &Html) -> Option<String> {
        let selector = Selector::parse(&format!("input[id='{}']", self.input_id)).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("value"))
            .map(|v| v.trim().to_string())
    }
}

/// Protocol-level verdict on one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOutcome {
    Ok,
    /// Record deleted; permanent.
    Gone,
    /// Empty body to a GET or POST.
    Malformed,
    /// Redirected to the generic error page.
    ServerError,
    /// Range selector came back reset. Carries tokens from the returned page.
    RangeMismatch {
        requested: String,
        returned: String,
        fresh: SessionTokens,
    },
}

/// Classify a response to `request`.
pub fn classify(response: &HttpResponse, request: &HttpRequest, range: &RangeSelector) -> ProtocolOutcome {
    if is_error_page(&response.final_url) {
        return ProtocolOutcome::ServerError;
    }
    if response.body.trim().is_empty() && matches!(request.method, Method::Get | Method::Post) {
        return ProtocolOutcome::Malformed;
    }
    if shows_gone_notice(&response.body) {
        return ProtocolOutcome::Gone;
    }

    if let Some(requested) = request.form.as_ref().and_then(|f| range.requested(f)) {
        let document = Html::parse_document(&response.body);
        if let Some(returned) = range.returned(&document) {
            if returned != RangeSelector::displayed(&requested) {
                return ProtocolOutcome::RangeMismatch {
                    requested,
                    returned,
                    fresh: SessionTokens::capture(&document),
                };
            }
        }
    }

    ProtocolOutcome::Ok
}

/// True when the notice appears in the page chrome rather than inside the
/// record's own text or detail grid.
fn shows_gone_notice(body: &str) -> bool {
    if !body.contains(GONE_NOTICE) {
        return false;
    }
    let document = Html::parse_document(body);
    document.root_element().descendants().any(|node| {
        let is_notice = node.value().as_text().is_some_and(|text| text.contains(GONE_NOTICE));
        is_notice
            && !node.ancestors().filter_map(ElementRef::wrap).any(|el| {
                el.value()
                    .id()
                    .is_some_and(|id| CONTENT_CONTAINERS.iter().any(|c| id.contains(c)))
            })
    })
}

fn is_error_page(final_url: &str) -> bool {
    let path = final_url.split(['?', '#']).next().unwrap_or_default();
    path.to_ascii_lowercase().ends_with("error.aspx")
}

/// Translate a protocol verdict into a fetcher decision, refreshing the
/// retry payload on a range mismatch.
fn inspect(outcome: ProtocolOutcome, request: &mut HttpRequest) -> Inspection {
    match outcome {
        ProtocolOutcome::Ok => Inspection::Accept,
        ProtocolOutcome::Gone => Inspection::Gone,
        ProtocolOutcome::Malformed => Inspection::Retry("empty response body".into()),
        ProtocolOutcome::ServerError => Inspection::Retry("redirected to error page".into()),
        ProtocolOutcome::RangeMismatch {
            requested,
            returned,
            fresh,
        } => {
            // Stale tokens would reproduce the reset on the retry.
            if let Some(form) = request.form.as_mut() {
                fresh.overwrite(form);
            }
            Inspection::Retry(format!(
                "range selector returned {:?}, requested {:?}",
                returned, requested
            ))
        }
    }
}

/// One crawl's conversation with the web interface.
///
/// Owns the tokens; a session is driven strictly sequentially through
/// `&mut self`, so response *n* always feeds request *n+1*.
pub struct PostbackSession<'a> {
    fetcher: &'a Fetcher,
    tokens: SessionTokens,
    range: RangeSelector,
}

impl<'a> PostbackSession<'a> {
    pub fn new(fetcher: &'a Fetcher) -> Self {
        Self {
            fetcher,
            tokens: SessionTokens::default(),
            range: RangeSelector::default(),
        }
    }

    pub fn with_range_selector(mut self, range: RangeSelector) -> Self {
        self.range = range;
        self
    }

    pub fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    pub fn fetcher(&self) -> &'a Fetcher {
        self.fetcher
    }

    /// GET a page.
    pub async fn get(&mut self, url: &str) -> FetchResult<Page> {
        self.submit(HttpRequest::get(url)).await
    }

    /// POST a payload with the current tokens merged under it.
    pub async fn post(&mut self, url: &str, mut payload: Form) -> FetchResult<Page> {
        self.tokens.merge(&mut payload);
        self.submit(HttpRequest::post(url, payload)).await
    }

    async fn submit(&mut self, request: HttpRequest) -> FetchResult<Page> {
        let range = self.range.clone();
        let url = request.display_url();

        let response = self
            .fetcher
            .fetch_with(request, |resp, req| inspect(classify(resp, req, &range), req))
            .await?;

        match response.status {
            410 => return Err(FetchError::Gone { url }),
            s if !(200..300).contains(&s) => return Err(FetchError::Status { url, status: s }),
            _ => {}
        }

        let page = Page::new(response.final_url, response.body);
        self.adopt(&page);
        Ok(page)
    }

    /// Take the tokens of a page fetched outside this session, so the next
    /// POST answers that page.
    pub fn adopt(&mut self, page: &Page) {
        let captured = SessionTokens::from_html(&page.html);
        if captured.is_empty() {
            debug!(url = %page.url, "No postback tokens on page");
        } else {
            self.tokens = captured;
        }
        if self.tokens.event_validation.is_none() && !self.tokens.is_empty() {
            debug!(url = %page.url, "Page carries no event validation token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use crate::testing::{fixtures, MockReply, MockTransport};
    use std::sync::Arc;

    fn form_page(view_state: &str, validation: Option<&str>) -> String {
        fixtures::form_page(view_state, validation, "<p>body</p>")
    }

    #[test]
    fn test_capture_tolerates_missing_validation() {
        let tokens = SessionTokens::from_html(&form_page("V1", None));
        assert_eq!(tokens.view_state.as_deref(), Some("V1"));
        assert_eq!(tokens.event_validation, None);
    }

    #[test]
    fn test_merge_keeps_explicit_keys() {
        let tokens = SessionTokens::from_html(&form_page("V1", Some("E1")));

        let mut payload = Form::new();
        payload.insert("ctl00$ContentPlaceHolder1$txtSearch".into(), "zoning".into());
        tokens.merge(&mut payload);
        assert_eq!(payload[VIEWSTATE], "V1");
        assert_eq!(payload[EVENT_VALIDATION], "E1");
        assert_eq!(payload[EVENT_ARGUMENT], "");
        assert_eq!(payload["ctl00$ContentPlaceHolder1$txtSearch"], "zoning");

        let mut overridden = Form::new();
        overridden.insert(VIEWSTATE.into(), "mine".into());
        tokens.merge(&mut overridden);
        assert_eq!(overridden[VIEWSTATE], "mine");
        assert_eq!(overridden[EVENT_VALIDATION], "E1");
    }

    #[test]
    fn test_classify_protocol_faults() {
        let range = RangeSelector::default();
        let get = HttpRequest::get("https://metro.legistar.com/LegislationDetail.aspx?ID=1");

        let error_page = HttpResponse::ok("https://metro.legistar.com/Error.aspx?aspxerrorpath=x", "<html/>");
        assert_eq!(classify(&error_page, &get, &range), ProtocolOutcome::ServerError);

        let empty = HttpResponse::ok(&get.url, "  ");
        assert_eq!(classify(&empty, &get, &range), ProtocolOutcome::Malformed);

        let head = HttpRequest::head(&get.url);
        assert_eq!(classify(&empty, &head, &range), ProtocolOutcome::Ok);

        let gone = HttpResponse::ok(&get.url, "This record no longer exists. It might have been deleted.");
        assert_eq!(classify(&gone, &get, &range), ProtocolOutcome::Gone);
    }

    #[test]
    fn test_quoted_notice_in_record_text_is_not_gone() {
        let range = RangeSelector::default();
        let get = HttpRequest::get("https://metro.legistar.com/LegislationDetail.aspx?ID=5&GUID=G&FullText=1");

        let phrase = HttpResponse::ok(
            &get.url,
            fixtures::form_page("V", None, "<p>The Lakeside Sanitary District no longer exists as a taxing body.</p>"),
        );
        assert_eq!(classify(&phrase, &get, &range), ProtocolOutcome::Ok);

        let quoted = HttpResponse::ok(
            &get.url,
            fixtures::form_page(
                "V",
                None,
                r#"<div id="ctl00_ContentPlaceHolder1_divText"><p>Staff replied: "This record no longer exists in the assessor database."</p></div>"#,
            ),
        );
        assert_eq!(classify(&quoted, &get, &range), ProtocolOutcome::Ok);
    }

    #[test]
    fn test_classify_range_mismatch_carries_fresh_tokens() {
        let range = RangeSelector::default();
        let mut form = Form::new();
        form.insert(range.client_state_field.clone(), RangeSelector::client_state("All"));
        let request = HttpRequest::post("https://metro.legistar.com/Calendar.aspx", form);

        let reset = fixtures::form_page("V2", Some("E2"), &fixtures::range_input("This Month"));
        let outcome = classify(&HttpResponse::ok(&request.url, reset), &request, &range);
        match outcome {
            ProtocolOutcome::RangeMismatch { returned, fresh, .. } => {
                assert_eq!(returned, "This Month");
                assert_eq!(fresh.view_state.as_deref(), Some("V2"));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }

        let honored = fixtures::form_page("V3", None, &fixtures::range_input("All Years"));
        assert_eq!(
            classify(&HttpResponse::ok(&request.url, honored), &request, &range),
            ProtocolOutcome::Ok
        );
    }

    #[tokio::test]
    async fn test_range_mismatch_retries_with_refreshed_tokens() {
        let url = "https://metro.legistar.com/Calendar.aspx";
        let mock = MockTransport::new()
            .once_url(url, MockReply::html(fixtures::form_page("V1", Some("E1"), "")))
            .once_url(
                url,
                MockReply::html(fixtures::form_page("V2", Some("E2"), &fixtures::range_input("This Year"))),
            )
            .once_url(
                url,
                MockReply::html(fixtures::form_page("V3", Some("E3"), &fixtures::range_input("All Years"))),
            );
        let fetcher = Fetcher::new(Arc::new(mock.clone())).with_retry(RetryPolicy::new(3, Default::default()));
        let mut session = PostbackSession::new(&fetcher);

        session.get(url).await.unwrap();
        let range = RangeSelector::default();
        let mut payload = Form::new();
        payload.insert(range.client_state_field.clone(), RangeSelector::client_state("All"));
        session.post(url, payload).await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        let first_post = calls[1].form.as_ref().unwrap();
        let retry_post = calls[2].form.as_ref().unwrap();
        assert_eq!(first_post[VIEWSTATE], "V1");
        assert_eq!(retry_post[VIEWSTATE], "V2");
        assert_eq!(retry_post[EVENT_VALIDATION], "E2");
        assert_eq!(session.tokens().view_state.as_deref(), Some("V3"));
    }

    #[tokio::test]
    async fn test_gone_notice_is_explicit_absence() {
        let url = "https://metro.legistar.com/MeetingDetail.aspx?ID=9";
        let mock = MockTransport::new().always_url(
            url,
            MockReply::html("<html><body>This record no longer exists.</body></html>"),
        );
        let fetcher = Fetcher::new(Arc::new(mock.clone())).with_retry(RetryPolicy::new(3, Default::default()));
        let mut session = PostbackSession::new(&fetcher);

        let err = session.get(url).await.unwrap_err();
        assert!(matches!(err, FetchError::Gone { .. }));
        assert_eq!(mock.call_count(), 1);
    }
}
