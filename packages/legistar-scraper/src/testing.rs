//! Testing utilities.
//!
//! [`MockTransport`] answers requests from an ordered list of rules and
//! records every call. [`fixtures`] builds HTML and iCalendar bodies shaped
//! like the platform's.
//!
//! # Example
//!
//! ```rust,ignore
//! use legistar_scraper::testing::{MockReply, MockTransport};
//!
//! let mock = MockTransport::new()
//!     .once_url("https://metro.legistar.com/Calendar.aspx", MockReply::status(503, ""))
//!     .always_url("https://metro.legistar.com/Calendar.aspx", MockReply::html("<html/>"));
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{FetchError, FetchResult};
use crate::traits::transport::{HttpRequest, HttpResponse, Transport};

type Matcher = Box<dyn Fn(&HttpRequest) -> bool + Send + Sync>;

/// A canned answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response {
        status: u16,
        body: String,
        /// Reported final URL; the request URL when `None`.
        final_url: Option<String>,
    },
    /// Fail below HTTP, like a timeout.
    NetworkError(String),
}

impl MockReply {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        MockReply::Response {
            status,
            body: body.into(),
            final_url: None,
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    /// A 200 reached after redirecting to `final_url`.
    pub fn redirected(final_url: impl Into<String>, body: impl Into<String>) -> Self {
        MockReply::Response {
            status: 200,
            body: body.into(),
            final_url: Some(final_url.into()),
        }
    }
}

struct Rule {
    matcher: Matcher,
    reply: MockReply,
    once: bool,
    used: bool,
}

/// Rule-based mock transport.
///
/// Rules are tried in insertion order; a `once` rule retires after its first
/// match. Requests no rule matches get a 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<RwLock<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, matcher: Matcher, reply: MockReply, once: bool) -> Self {
        self.rules.lock().unwrap().push(Rule {
            matcher,
            reply,
            once,
            used: false,
        });
        self
    }

    /// Answer the next request to `url` (query ignored) once.
    pub fn once_url(self, url: impl Into<String>, reply: MockReply) -> Self {
        let url = url.into();
        self.push(Box::new(move |r| r.url == url), reply, true)
    }

    /// Answer every request to `url` (query ignored).
    pub fn always_url(self, url: impl Into<String>, reply: MockReply) -> Self {
        let url = url.into();
        self.push(Box::new(move |r| r.url == url), reply, false)
    }

    /// Answer the next request matching `predicate` once.
    pub fn once_when<F>(self, predicate: F, reply: MockReply) -> Self
    where
        F: Fn(&HttpRequest) -> bool + Send + Sync + 'static,
    {
        self.push(Box::new(predicate), reply, true)
    }

    /// Answer every request matching `predicate`.
    pub fn always_when<F>(self, predicate: F, reply: MockReply) -> Self
    where
        F: Fn(&HttpRequest) -> bool + Send + Sync + 'static,
    {
        self.push(Box::new(predicate), reply, false)
    }

    /// Every request sent, in order.
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Requests sent to `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> FetchResult<HttpResponse> {
        self.calls.write().unwrap().push(request.clone());

        let reply = {
            let mut rules = self.rules.lock().unwrap();
            rules
                .iter_mut()
                .find(|rule| !rule.used && (rule.matcher)(request))
                .map(|rule| {
                    if rule.once {
                        rule.used = true;
                    }
                    rule.reply.clone()
                })
        };

        match reply {
            Some(MockReply::Response {
                status,
                body,
                final_url,
            }) => Ok(HttpResponse::new(
                status,
                final_url.unwrap_or_else(|| request.url.clone()),
                body,
            )),
            Some(MockReply::NetworkError(message)) => Err(FetchError::Transport {
                url: request.display_url(),
                source: message.into(),
            }),
            None => Ok(HttpResponse::new(404, request.url.clone(), "not found")),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Platform-shaped HTML and iCalendar bodies.
pub mod fixtures {
    /// A postback form page wrapping `inner`.
    pub fn form_page(view_state: &str, validation: Option<&str>, inner: &str) -> String {
        let validation = validation
            .map(|v| {
                format!(
                    r#"<input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="{}" />"#,
                    v
                )
            })
            .unwrap_or_default();
        format!(
            r#"<html><head><title>Legistar</title></head><body>
<form method="post" id="aspnetForm">
<input type="hidden" name="__EVENTTARGET" id="__EVENTTARGET" value="" />
<input type="hidden" name="__EVENTARGUMENT" id="__EVENTARGUMENT" value="" />
<input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="{}" />
{}
{}
</form></body></html>"#,
            view_state, validation, inner
        )
    }

    /// The year selector's visible input showing `value`.
    pub fn range_input(value: &str) -> String {
        format!(
            r#"<input id="ctl00_ContentPlaceHolder1_lstYears_Input" name="ctl00$ContentPlaceHolder1$lstYears" type="text" value="{}" />"#,
            value
        )
    }

    /// Pager with `current` marked and, when given, a next-page link posting
    /// back to `next_target`.
    pub fn pager(current: usize, next_target: Option<&str>) -> String {
        let next = next_target
            .map(|target| {
                format!(
                    r#"<a href="javascript:__doPostBack('{}','')"><span>{}</span></a>"#,
                    target,
                    current + 1
                )
            })
            .unwrap_or_default();
        format!(
            r#"<tr class="rgPager"><td><div class="rgWrap rgNumPart"><a href="javascript:__doPostBack('ctl00$pager$current','')" class="rgCurrentPage"><span>{}</span></a>{}</div></td></tr>"#,
            current, next
        )
    }

    /// A results grid. Cells are raw HTML; `pager` is placed in the header
    /// section like the platform does.
    pub fn grid(id: &str, headers: &[&str], rows: &[Vec<String>], pager: &str) -> String {
        let header_cells: String = headers
            .iter()
            .map(|h| format!(r#"<th class="rgHeader" scope="col">{}</th>"#, h))
            .collect();
        let body: String = rows
            .iter()
            .enumerate()
            .map(|(i, cells)| {
                let class = if i % 2 == 0 { "rgRow" } else { "rgAltRow" };
                let tds: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
                format!(r#"<tr class="{}">{}</tr>"#, class, tds)
            })
            .collect();
        format!(
            r#"<table class="rgMasterTable" id="{}"><thead>{}<tr>{}</tr></thead><tbody>{}</tbody></table>"#,
            id, pager, header_cells, body
        )
    }

    /// A grid showing the "no records" row.
    pub fn empty_grid(id: &str, headers: &[&str]) -> String {
        let header_cells: String = headers
            .iter()
            .map(|h| format!(r#"<th class="rgHeader">{}</th>"#, h))
            .collect();
        format!(
            r#"<table class="rgMasterTable" id="{}"><thead><tr>{}</tr></thead><tbody><tr class="rgNoRecords"><td colspan="{}"><div>No records to display.</div></td></tr></tbody></table>"#,
            id,
            header_cells,
            headers.len()
        )
    }

    /// Detail div of label/value span pairs keyed by control id suffix.
    pub fn detail_div(div_id: &str, fields: &[(&str, &str, &str)]) -> String {
        let spans: String = fields
            .iter()
            .map(|(key, label, value)| {
                format!(
                    r#"<tr><td><span id="ctl00_ContentPlaceHolder1_lbl{key}X">{label}:</span></td><td><span id="ctl00_ContentPlaceHolder1_lbl{key}2">{value}</span></td></tr>"#,
                )
            })
            .collect();
        format!(r#"<div id="{}"><table>{}</table></div>"#, div_id, spans)
    }

    /// Calendar attachment with one event.
    pub fn ical(dtstart: &str, tzid: Option<&str>) -> String {
        let start = match tzid {
            Some(tz) => format!("DTSTART;TZID={}:{}", tz, dtstart),
            None => format!("DTSTART:{}", dtstart),
        };
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Granicus//Legistar//EN\r\nBEGIN:VEVENT\r\n{}\r\nSUMMARY:Meeting\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
            start
        )
    }
}
