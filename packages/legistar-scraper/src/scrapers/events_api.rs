//! REST events, their items, and their web counterparts.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, warn};

use super::events_web::{event_details, WebCalendar};
use super::get_list;
use crate::context::CrawlContext;
use crate::error::{DataFault, Result, ScrapeError};
use crate::extract::media_type_for_name;
use crate::paging::{RestPager, SearchWindow};
use crate::reconcile::{ApiEventKeyer, CalendarRowKeyer, EventKeyer, EventReconciler};
use crate::traits::transport::HttpRequest;
use crate::types::api::{ApiEvent, ApiEventItem, ApiRollCall};
use crate::types::config::ReconcileMode;
use crate::types::page::DetailRecord;
use crate::types::records::{AgendaItem, Document, Event, Participant, SourceLink};

/// Timestamps whose advance makes an event worth revisiting.
pub const EVENT_SINCE_FIELDS: &[&str] = &[
    "EventLastModifiedUtc",
    "EventAgendaLastPublishedUTC",
    "EventMinutesLastPublishedUTC",
    "EventDate",
];

/// Local start of a REST event: its date plus its hand-entered time.
pub fn event_start(event: &ApiEvent, tz: Tz) -> std::result::Result<DateTime<Tz>, DataFault> {
    let text = event.event_time.as_deref().unwrap_or_default().trim();
    let fault = || DataFault::StartTime { text: text.to_string() };

    let date = event
        .event_date
        .as_deref()
        .and_then(|d| d.get(..10))
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| DataFault::MissingField("EventDate".to_string()))?;
    let time = NaiveTime::parse_from_str(text, "%I:%M %p").map_err(|_| fault())?;

    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .ok_or_else(fault)
}

/// REST event routes.
pub struct ApiEvents<'c> {
    ctx: &'c CrawlContext,
}

impl<'c> ApiEvents<'c> {
    pub fn new(ctx: &'c CrawlContext) -> Self {
        Self { ctx }
    }

    /// Events changed since `since`, widened by the configured look-back.
    pub fn search(&self, since: Option<NaiveDateTime>) -> RestPager<'c, ApiEvent> {
        let window = SearchWindow::new(since).with_look_back_hours(self.ctx.config.event_lookback_hours);
        RestPager::new(&self.ctx.fetcher, self.ctx.config.api_url("events"), "EventId")
            .with_filter(window.filter(EVENT_SINCE_FIELDS))
    }

    async fn items(&self, event_id: i64) -> Result<Vec<ApiEventItem>> {
        let request = HttpRequest::get(self.ctx.config.api_url(&format!("events/{}/eventitems", event_id)))
            .with_query("AgendaNote", "1")
            .with_query("MinutesNote", "1")
            .with_query("Attachments", "1");
        get_list(self.ctx, request).await
    }

    /// Titled agenda items in agenda order.
    pub async fn agenda(&self, event_id: i64) -> Result<Vec<ApiEventItem>> {
        let items = self.items(event_id).await?;
        Ok(ordered_items(items, |item| item.event_item_agenda_sequence))
    }

    /// Titled minutes items in minutes order.
    pub async fn minutes(&self, event_id: i64) -> Result<Vec<ApiEventItem>> {
        let items = self.items(event_id).await?;
        Ok(ordered_items(items, |item| item.event_item_minutes_sequence))
    }

    /// Attendance for an item flagged for roll call; empty otherwise.
    pub async fn roll_call(&self, item: &ApiEventItem) -> Result<Vec<ApiRollCall>> {
        if item.event_item_roll_call_flag != Some(1) {
            return Ok(Vec::new());
        }
        let url = self
            .ctx
            .config
            .api_url(&format!("eventitems/{}/rollcalls", item.event_item_id));
        get_list(self.ctx, HttpRequest::get(url)).await
    }

    /// Web detail reached through the event's in-site link. Forbidden, gone
    /// and unavailable pages count as no counterpart.
    pub async fn in_site_detail(&self, event: &ApiEvent) -> Result<Option<DetailRecord>> {
        let Some(url) = event.event_in_site_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            debug!(event_id = event.event_id, "API event has no in-site URL");
            return Ok(None);
        };

        match event_details(self.ctx, url).await {
            Ok(record) => Ok(Some(record)),
            Err(ScrapeError::Fetch(e)) if matches!(e.status(), Some(403 | 410 | 503)) => {
                warn!(event_id = event.event_id, url = %url, error = %e, "Web detail unavailable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn ordered_items<F>(items: Vec<ApiEventItem>, sequence: F) -> Vec<ApiEventItem>
where
    F: Fn(&ApiEventItem) -> Option<i64>,
{
    let mut kept: Vec<ApiEventItem> = items
        .into_iter()
        .filter(|item| {
            item.event_item_title
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
                && sequence(item).is_some()
        })
        .collect();
    kept.sort_by_key(|item| sequence(item));
    kept
}

/// A REST event with its computed start, status and web counterpart.
#[derive(Debug, Clone)]
pub struct ReconciledEvent {
    pub event: ApiEvent,
    pub start: DateTime<Tz>,
    pub status: String,
    /// `None` when the web interface has no matching event.
    pub web: Option<DetailRecord>,
}

enum WebLookup<'c> {
    InSite,
    CalendarScan {
        reconciler: Box<EventReconciler<WebCalendar<'c>, CalendarRowKeyer<'c>>>,
        keyer: ApiEventKeyer<'c>,
    },
}

/// Incremental REST event crawl, pairing each event with its web page.
pub struct EventCrawl<'c> {
    ctx: &'c CrawlContext,
    api: ApiEvents<'c>,
    tz: Tz,
    now: DateTime<Utc>,
    pager: RestPager<'c, ApiEvent>,
    lookup: WebLookup<'c>,
}

impl<'c> EventCrawl<'c> {
    pub fn new(ctx: &'c CrawlContext, since: Option<NaiveDateTime>) -> Result<Self> {
        let tz = ctx.tz()?;
        let api = ApiEvents::new(ctx);
        let pager = api.search(since);

        let lookup = match ctx.config.reconcile {
            ReconcileMode::InSite => WebLookup::InSite,
            ReconcileMode::CalendarScan => {
                let calendar = WebCalendar::starting_now(ctx, None)?;
                let row_keyer = CalendarRowKeyer::new(&ctx.fetcher, tz, ctx.label("event.body"))
                    .with_not_available(ctx.config.not_available.clone());
                WebLookup::CalendarScan {
                    reconciler: Box::new(EventReconciler::new(calendar, row_keyer)),
                    keyer: ApiEventKeyer::new(&ctx.fetcher, &ctx.config, tz),
                }
            }
        };

        Ok(Self {
            ctx,
            api,
            tz,
            now: Utc::now(),
            pager,
            lookup,
        })
    }

    /// Reference time for event status.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Next event with a parseable start time.
    pub async fn next(&mut self) -> Result<Option<ReconciledEvent>> {
        loop {
            let Some(event) = self.pager.next().await? else {
                return Ok(None);
            };

            let start = match event_start(&event, self.tz) {
                Ok(start) => start,
                Err(fault) => {
                    error!(event_id = event.event_id, error = %fault, "API event has invalid start time, skipping");
                    continue;
                }
            };
            let status = self.ctx.hooks.event_status(&start, &self.now, &event);

            let web = if self.ctx.hooks.not_in_web_interface(&event) {
                debug!(event_id = event.event_id, "Event not shown on the web interface");
                None
            } else {
                let web = self.web_counterpart(&event).await?;
                if web.is_none() {
                    warn!(
                        event_id = event.event_id,
                        body = %event.event_body_name,
                        start = %start,
                        "No web counterpart for API event"
                    );
                }
                web
            };

            return Ok(Some(ReconciledEvent {
                event,
                start,
                status,
                web,
            }));
        }
    }

    async fn web_counterpart(&mut self, event: &ApiEvent) -> Result<Option<DetailRecord>> {
        match &mut self.lookup {
            WebLookup::InSite => self.api.in_site_detail(event).await,
            WebLookup::CalendarScan { reconciler, keyer } => {
                let Some(key) = keyer.key(event).await? else {
                    return Ok(None);
                };
                reconciler.lookup(&key).await
            }
        }
    }

    /// Agenda items for a crawled event.
    pub async fn agenda(&self, event: &ReconciledEvent) -> Result<Vec<ApiEventItem>> {
        self.api.agenda(event.event.event_id).await
    }
}

fn file_document(note: &str, url: &str) -> Document {
    Document {
        note: note.to_string(),
        url: url.to_string(),
        media_type: media_type_for_name(url).or_else(|| Some("application/pdf".to_string())),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Build the output event from a reconciled event and its agenda items.
pub fn assemble_event(ctx: &CrawlContext, reconciled: &ReconciledEvent, agenda: &[ApiEventItem]) -> Event {
    let event = &reconciled.event;
    let web = reconciled.web.as_ref();

    let agenda = agenda
        .iter()
        .map(|item| AgendaItem {
            description: item.event_item_title.clone().unwrap_or_default().trim().to_string(),
            order: item.event_item_agenda_sequence.unwrap_or_default(),
            bill_identifier: non_empty(&item.event_item_matter_file).map(str::to_string),
            notes: non_empty(&item.event_item_action_name).map(str::to_string),
        })
        .collect();

    let mut documents = Vec::new();
    for (note, api_file, label) in [
        ("Agenda", &event.event_agenda_file, "event.agenda"),
        ("Minutes", &event.event_minutes_file, "event.minutes"),
    ] {
        let web_link = web.and_then(|w| ctx.field(w, label)).and_then(|v| v.url());
        if let Some(url) = non_empty(api_file).or(web_link) {
            documents.push(file_document(note, url));
        }
    }

    let mut media = Vec::new();
    let web_video = web
        .and_then(|w| ctx.field(w, "event.video"))
        .and_then(|v| v.url());
    if let Some(url) = non_empty(&event.event_video_path).or(web_video) {
        media.push(Document {
            note: "Recording".to_string(),
            url: url.to_string(),
            media_type: Some("text/html".to_string()),
        });
    }

    let mut sources = vec![
        SourceLink::new(ctx.config.api_url(&format!("events/{}", event.event_id))).with_note("api"),
    ];
    if let Some(url) = non_empty(&event.event_in_site_url) {
        sources.push(SourceLink::new(url).with_note("web"));
    }

    Event {
        id: event.event_id,
        name: event.event_body_name.trim().to_string(),
        start: reconciled.start.to_rfc3339(),
        status: reconciled.status.clone(),
        location: non_empty(&event.event_location).unwrap_or_default().to_string(),
        description: non_empty(&event.event_comment).map(str::to_string),
        participants: vec![Participant {
            name: event.event_body_name.trim().to_string(),
            entity_type: "organization".to_string(),
            note: "host".to_string(),
        }],
        agenda,
        documents,
        media,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Fetcher, RetryPolicy};
    use crate::testing::{fixtures, MockReply, MockTransport};
    use crate::types::config::JurisdictionConfig;
    use crate::types::page::{FieldMap, FieldValue};
    use std::sync::Arc;

    const TZ: Tz = chrono_tz::America::Los_Angeles;
    const EVENTS: &str = "https://webapi.legistar.com/v1/metro/events";

    fn config() -> JurisdictionConfig {
        JurisdictionConfig::new(
            "metro",
            "https://metro.legistar.com",
            "https://webapi.legistar.com/v1/metro",
            "America/Los_Angeles",
        )
    }

    fn context(mock: &MockTransport, config: JurisdictionConfig) -> CrawlContext {
        let fetcher = Fetcher::new(Arc::new(mock.clone())).with_retry(RetryPolicy::once());
        CrawlContext::with_transport(config, Arc::new(mock.clone())).with_fetcher(fetcher)
    }

    fn api_event(id: i64, body: &str, time: Option<&str>) -> ApiEvent {
        ApiEvent {
            event_id: id,
            event_guid: Some(format!("G{}", id)),
            event_body_name: body.to_string(),
            event_date: Some("2020-01-02T00:00:00".to_string()),
            event_time: time.map(str::to_string),
            event_in_site_url: Some(format!("https://metro.legistar.com/MeetingDetail.aspx?ID={}", id)),
            ..Default::default()
        }
    }

    #[test]
    fn test_event_start_in_local_time() {
        let start = event_start(&api_event(1, "Council", Some("6:00 PM")), TZ).unwrap();
        assert_eq!(start, TZ.with_ymd_and_hms(2020, 1, 2, 18, 0, 0).unwrap());

        let padded = event_start(&api_event(1, "Council", Some("09:30 AM")), TZ).unwrap();
        assert_eq!(padded, TZ.with_ymd_and_hms(2020, 1, 2, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_event_start_faults() {
        let bad = event_start(&api_event(1, "Council", Some("TBD")), TZ).unwrap_err();
        assert_eq!(bad, DataFault::StartTime { text: "TBD".into() });
        assert!(matches!(
            event_start(&api_event(1, "Council", None), TZ),
            Err(DataFault::StartTime { .. })
        ));

        let mut undated = api_event(1, "Council", Some("6:00 PM"));
        undated.event_date = None;
        assert!(matches!(event_start(&undated, TZ), Err(DataFault::MissingField(_))));
    }

    #[test]
    fn test_ordered_items_filters_untitled_and_unsequenced() {
        let item = |id: i64, title: Option<&str>, seq: Option<i64>| ApiEventItem {
            event_item_id: id,
            event_item_title: title.map(str::to_string),
            event_item_agenda_sequence: seq,
            ..Default::default()
        };
        let items = vec![
            item(1, Some("Budget"), Some(3)),
            item(2, None, Some(1)),
            item(3, Some("Zoning"), Some(2)),
            item(4, Some("Note"), None),
            item(5, Some("  "), Some(4)),
        ];
        let ids: Vec<i64> = ordered_items(items, |i| i.event_item_agenda_sequence)
            .iter()
            .map(|i| i.event_item_id)
            .collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_roll_call_only_for_flagged_items() {
        let mock = MockTransport::new().always_url(
            "https://webapi.legistar.com/v1/metro/eventitems/7/rollcalls",
            MockReply::json(r#"[{"RollCallId": 1, "RollCallPersonName": "Ada", "RollCallValueName": "Present"}]"#),
        );
        let ctx = context(&mock, config());
        let api = ApiEvents::new(&ctx);

        let mut item = ApiEventItem {
            event_item_id: 7,
            ..Default::default()
        };
        assert!(api.roll_call(&item).await.unwrap().is_empty());
        assert_eq!(mock.call_count(), 0);

        item.event_item_roll_call_flag = Some(1);
        let roll = api.roll_call(&item).await.unwrap();
        assert_eq!(roll[0].roll_call_person_name, "Ada");
    }

    #[tokio::test]
    async fn test_in_site_crawl_skips_bad_times_and_keeps_unmatched() {
        let events = serde_json::to_string(&vec![
            api_event(1, "Council", Some("6:00 PM")),
            api_event(2, "Council", Some("TBD")),
            api_event(3, "Finance", Some("10:00 AM")),
        ])
        .unwrap();
        let detail = fixtures::form_page(
            "V",
            None,
            &fixtures::detail_div(
                "ctl00_ContentPlaceHolder1_pageTop1",
                &[("Name", "Meeting Name", "Council"), ("Location", "Meeting location", "Room 1")],
            ),
        );
        let mock = MockTransport::new()
            .once_url(EVENTS, MockReply::json(events))
            .always_url(
                "https://metro.legistar.com/MeetingDetail.aspx?ID=1",
                MockReply::html(detail),
            )
            .always_url(
                "https://metro.legistar.com/MeetingDetail.aspx?ID=3",
                MockReply::status(410, "Gone"),
            );
        let ctx = context(&mock, config());

        let now = Utc.with_ymd_and_hms(2020, 1, 2, 20, 0, 0).unwrap();
        let mut crawl = EventCrawl::new(&ctx, None).unwrap().with_now(now);

        let first = crawl.next().await.unwrap().unwrap();
        assert_eq!(first.event.event_id, 1);
        assert_eq!(first.status, "confirmed");
        let web = first.web.unwrap();
        assert_eq!(web.text_of("Meeting location").as_deref(), Some("Room 1"));

        let second = crawl.next().await.unwrap().unwrap();
        assert_eq!(second.event.event_id, 3);
        assert_eq!(second.status, "passed");
        assert!(second.web.is_none());

        assert!(crawl.next().await.unwrap().is_none());
        assert_eq!(mock.calls_to("https://metro.legistar.com/MeetingDetail.aspx?ID=2"), 0);
    }

    #[tokio::test]
    async fn test_since_filter_applies_look_back() {
        let mock = MockTransport::new().once_url(EVENTS, MockReply::json("[]"));
        let ctx = context(&mock, config());

        let since = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let records = ApiEvents::new(&ctx).search(Some(since)).collect_all().await.unwrap();
        assert!(records.is_empty());

        let filter = mock.calls()[0].query_value("$filter").unwrap().to_string();
        assert!(filter.contains("EventLastModifiedUtc gt datetime'2020-01-01T00:00:00'"));
        assert!(filter.contains(" or EventDate gt datetime'2020-01-01T00:00:00'"));
    }

    #[test]
    fn test_assemble_event_prefers_api_files_then_web_links() {
        let mock = MockTransport::new();
        let ctx = context(&mock, config());

        let mut event = api_event(1, " Council ", Some("6:00 PM"));
        event.event_agenda_file = Some("https://metro.legistar.com/View.ashx?M=A&ID=1".into());
        event.event_location = Some("Room 1".into());

        let mut web = DetailRecord::new();
        web.insert(
            "Minutes".into(),
            FieldValue::Link(crate::types::page::Link::new("Minutes", "https://metro.legistar.com/m.pdf")),
        );
        web.insert("Video".into(), FieldValue::text("Not available"));

        let reconciled = ReconciledEvent {
            start: event_start(&event, TZ).unwrap(),
            event,
            status: "passed".into(),
            web: Some(web),
        };
        let items = vec![ApiEventItem {
            event_item_id: 9,
            event_item_title: Some("Budget".into()),
            event_item_agenda_sequence: Some(1),
            event_item_matter_file: Some("20-1".into()),
            ..Default::default()
        }];

        let record = assemble_event(&ctx, &reconciled, &items);
        assert_eq!(record.name, "Council");
        assert_eq!(record.start, "2020-01-02T18:00:00-08:00");
        assert_eq!(record.location, "Room 1");
        assert_eq!(record.documents.len(), 2);
        assert_eq!(record.documents[0].media_type.as_deref(), Some("application/pdf"));
        assert_eq!(record.documents[1].url, "https://metro.legistar.com/m.pdf");
        assert!(record.media.is_empty());
        assert_eq!(record.agenda[0].bill_identifier.as_deref(), Some("20-1"));
        assert_eq!(record.sources.len(), 2);
    }
}
