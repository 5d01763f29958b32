//! Web calendar, event agendas and roll calls.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::context::CrawlContext;
use crate::error::Result;
use crate::extract::detail::page_details;
use crate::extract::table::{extract_table, ICALENDAR_KEY};
use crate::paging::{HtmlPager, SeenWindow};
use crate::reconcile::WebEventSource;
use crate::session::{PostbackSession, RangeSelector, EVENT_ARGUMENT, EVENT_TARGET};
use crate::traits::transport::Form;
use crate::types::page::{DetailRecord, FieldMap, TableRow};

pub const CALENDAR_GRID: &str = "ctl00_ContentPlaceHolder1_gridCalendar_ctl00";
pub const AGENDA_GRID: &str = "ctl00_ContentPlaceHolder1_gridMain_ctl00";
pub const ROLL_CALL_GRID: &str = "ctl00_ContentPlaceHolder1_gridRollCall_ctl00";
pub const EVENT_DETAIL_DIV: &str = "ctl00_ContentPlaceHolder1_pageTop1";

const YEAR_SELECTOR: &str = "ctl00$ContentPlaceHolder1$lstYears";
const DETAIL_MENU: &str = "ctl00$ContentPlaceHolder1$menuMain";
/// Menu argument that expands the agenda to every item.
const FULL_AGENDA: &str = "3:1";

/// Rows of the web calendar, newest year first.
///
/// Walks years from next year downwards, paging each. Stops at `since_year`
/// or after a past year with no events.
pub struct WebCalendar<'c> {
    ctx: &'c CrawlContext,
    session: PostbackSession<'c>,
    current_year: i32,
    years: VecDeque<i32>,
    year: Option<i32>,
    year_had_events: bool,
    pager: Option<HtmlPager>,
    rows: VecDeque<TableRow>,
    seen: SeenWindow<String>,
    seeded: bool,
    done: bool,
}

impl<'c> WebCalendar<'c> {
    /// Calendar as of `current_year`, back to `since_year` (all years when
    /// `None`).
    pub fn new(ctx: &'c CrawlContext, current_year: i32, since_year: Option<i32>) -> Self {
        let floor = since_year.unwrap_or(1900);
        Self {
            ctx,
            session: ctx.session(),
            current_year,
            years: (floor..=current_year + 1).rev().collect(),
            year: None,
            year_had_events: false,
            pager: None,
            rows: VecDeque::new(),
            seen: SeenWindow::new(10),
            seeded: false,
            done: false,
        }
    }

    /// Calendar as of today in the jurisdiction's timezone.
    pub fn starting_now(ctx: &'c CrawlContext, since_year: Option<i32>) -> Result<Self> {
        let year = Utc::now().with_timezone(&ctx.tz()?).year();
        Ok(Self::new(ctx, year, since_year))
    }

    /// Next calendar row.
    pub async fn next(&mut self) -> Result<Option<TableRow>> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                return Ok(Some(row));
            }
            if self.done {
                return Ok(None);
            }

            if self.pager.is_none() && !self.start_next_year().await? {
                self.done = true;
                continue;
            }

            let marker = &self.ctx.config.no_records_marker;
            let Some(pager) = self.pager.as_mut() else {
                continue;
            };
            match pager.next_grid(&mut self.session, CALENDAR_GRID, marker).await? {
                None => self.pager = None,
                Some(grid) => {
                    for row in grid.rows {
                        self.accept(row);
                    }
                }
            }
        }
    }

    fn accept(&mut self, row: TableRow) {
        let key = row
            .present(ICALENDAR_KEY)
            .and_then(|v| v.url())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", row.values().map(|v| v.label()).collect::<Vec<_>>()));

        if self.seen.insert(key) {
            self.year_had_events = true;
            self.rows.push_back(row);
        } else {
            debug!(year = ?self.year, "Skipping calendar row already seen");
        }
    }

    /// Submit the next year. False when the walk is over.
    async fn start_next_year(&mut self) -> Result<bool> {
        if let Some(year) = self.year {
            if !self.year_had_events && year <= self.current_year {
                info!(year, "No events in past year, calendar done");
                return Ok(false);
            }
        }
        let Some(year) = self.years.pop_front() else {
            return Ok(false);
        };

        let url = self.ctx.config.calendar_url();
        if !self.seeded {
            self.session.get(&url).await?;
            self.seeded = true;
        }

        debug!(year, "Requesting calendar year");
        self.pager = Some(HtmlPager::submit(&url, year_payload(year)).with_submit_button(None));
        self.year = Some(year);
        self.year_had_events = false;
        Ok(true)
    }
}

fn year_payload(year: i32) -> Form {
    let range = RangeSelector::default();
    let mut payload = Form::new();
    payload.insert(EVENT_TARGET.to_string(), YEAR_SELECTOR.to_string());
    payload.insert(EVENT_ARGUMENT.to_string(), String::new());
    payload.insert(range.client_state_field, RangeSelector::client_state(&year.to_string()));
    payload
}

#[async_trait]
impl<'c> WebEventSource for WebCalendar<'c> {
    type Item = TableRow;

    async fn next_event(&mut self) -> Result<Option<TableRow>> {
        self.next().await
    }
}

/// Every agenda item of an event detail page.
pub async fn agenda(ctx: &CrawlContext, detail_url: &str) -> Result<Vec<TableRow>> {
    let mut session = ctx.session();
    session.get(detail_url).await?;

    let mut payload = Form::new();
    payload.insert(EVENT_TARGET.to_string(), DETAIL_MENU.to_string());
    payload.insert(EVENT_ARGUMENT.to_string(), FULL_AGENDA.to_string());

    let mut pager = HtmlPager::submit(detail_url, payload).with_submit_button(None);
    let mut items = Vec::new();
    while let Some(grid) = pager
        .next_grid(&mut session, AGENDA_GRID, &ctx.config.no_records_marker)
        .await?
    {
        items.extend(grid.rows);
    }
    Ok(items)
}

/// Attendance rows of a roll call page.
pub async fn roll_call(ctx: &CrawlContext, action_url: &str) -> Result<Vec<TableRow>> {
    let page = ctx.session().get(action_url).await?;
    Ok(extract_table(&page, ROLL_CALL_GRID, &ctx.config.no_records_marker)?.rows)
}

/// Detail fields of an event page.
pub async fn event_details(ctx: &CrawlContext, detail_url: &str) -> Result<DetailRecord> {
    let page = ctx.session().get(detail_url).await?;
    page_details(&page, EVENT_DETAIL_DIV, ctx.hooks.field_extractor())
}
