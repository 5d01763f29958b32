//! Start times from calendar attachments.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::LazyLock;

static DTSTART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^DTSTART(?:;[^:\r\n]*)?:(\d{8})(?:T(\d{6})(Z)?)?").expect("static regex")
});

/// `DTSTART` of the first event in an iCalendar body, in `tz`.
///
/// UTC stamps are converted; floating and `TZID` stamps are taken as local
/// to the jurisdiction, whose deployments label zones with Windows names.
pub fn parse_dtstart(body: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let unfolded = body.replace("\r\n ", "").replace("\n ", "");
    let caps = DTSTART.captures(&unfolded)?;

    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y%m%d").ok()?;
    let naive = match caps.get(2) {
        Some(time) => NaiveDateTime::new(
            date,
            chrono::NaiveTime::parse_from_str(time.as_str(), "%H%M%S").ok()?,
        ),
        None => date.and_hms_opt(0, 0, 0)?,
    };

    if caps.get(3).is_some() {
        return Some(Utc.from_utc_datetime(&naive).with_timezone(&tz));
    }
    tz.from_local_datetime(&naive).earliest()
}
