//! Configuration types for jurisdictions and crawl sessions.

use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ScrapeError};
use crate::types::page::NOT_AVAILABLE;

/// How REST events are paired with their web calendar rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Follow the event's `EventInSiteURL` straight to its detail page.
    #[default]
    InSite,
    /// Scan the web calendar lazily, matching on body name and start time.
    CalendarScan,
}

/// Per-deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JurisdictionConfig {
    /// Registry key, e.g. `"chicago"`.
    pub id: String,

    /// Web interface root, e.g. `https://chicago.legistar.com`.
    pub web_base_url: String,

    /// REST interface root, e.g. `https://webapi.legistar.com/v1/chicago`.
    pub api_base_url: String,

    /// IANA timezone name used for every local date on the site.
    pub timezone: String,

    #[serde(default = "default_calendar_path")]
    pub calendar_path: String,

    #[serde(default = "default_legislation_path")]
    pub legislation_path: String,

    #[serde(default = "default_people_path")]
    pub people_path: String,

    /// Literal label text shown on this deployment.
    #[serde(default)]
    pub labels: LabelTable,

    /// Vote option/result text overrides, applied over the defaults.
    #[serde(default)]
    pub vote_options: HashMap<String, String>,

    /// Text of the grid row rendered when a query matches nothing.
    #[serde(default = "default_no_records")]
    pub no_records_marker: String,

    /// Texts rendered in place of a missing field value.
    #[serde(default = "default_not_available")]
    pub not_available: Vec<String>,

    /// Hours subtracted from the event `since` timestamp before filtering.
    #[serde(default = "default_event_lookback_hours")]
    pub event_lookback_hours: i64,

    /// Keep bills whose web page is restricted (403/410 on the gateway).
    #[serde(default)]
    pub keep_restricted_bills: bool,

    #[serde(default)]
    pub reconcile: ReconcileMode,
}

fn default_calendar_path() -> String {
    "Calendar.aspx".to_string()
}

fn default_legislation_path() -> String {
    "Legislation.aspx".to_string()
}

fn default_people_path() -> String {
    "People.aspx".to_string()
}

fn default_no_records() -> String {
    "No records to display.".to_string()
}

fn default_not_available() -> Vec<String> {
    NOT_AVAILABLE.iter().map(|s| s.to_string()).collect()
}

fn default_event_lookback_hours() -> i64 {
    24
}

impl JurisdictionConfig {
    /// Create a config with default paths and labels.
    pub fn new(
        id: impl Into<String>,
        web_base_url: impl Into<String>,
        api_base_url: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            web_base_url: web_base_url.into().trim_end_matches('/').to_string(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            timezone: timezone.into(),
            calendar_path: default_calendar_path(),
            legislation_path: default_legislation_path(),
            people_path: default_people_path(),
            labels: LabelTable::default(),
            vote_options: HashMap::new(),
            no_records_marker: default_no_records(),
            not_available: default_not_available(),
            event_lookback_hours: default_event_lookback_hours(),
            keep_restricted_bills: false,
            reconcile: ReconcileMode::default(),
        }
    }

    /// Override a label.
    pub fn with_label(mut self, logical: impl Into<String>, literal: impl Into<String>) -> Self {
        self.labels.set(logical, literal);
        self
    }

    /// Override a vote option mapping.
    pub fn with_vote_option(mut self, raw: impl Into<String>, option: impl Into<String>) -> Self {
        self.vote_options.insert(raw.into(), option.into());
        self
    }

    /// Treat `text` as a missing value too.
    pub fn with_not_available(mut self, text: impl Into<String>) -> Self {
        self.not_available.push(text.into());
        self
    }

    pub fn with_reconcile(mut self, mode: ReconcileMode) -> Self {
        self.reconcile = mode;
        self
    }

    pub fn with_event_lookback_hours(mut self, hours: i64) -> Self {
        self.event_lookback_hours = hours;
        self
    }

    pub fn with_keep_restricted_bills(mut self, keep: bool) -> Self {
        self.keep_restricted_bills = keep;
        self
    }

    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ScrapeError::Timezone(self.timezone.clone()))
    }

    /// Absolute web URL for a path relative to the web root.
    pub fn web_url(&self, path: &str) -> String {
        format!("{}/{}", self.web_base_url, path.trim_start_matches('/'))
    }

    /// Absolute REST URL for a route.
    pub fn api_url(&self, route: &str) -> String {
        format!("{}/{}", self.api_base_url, route.trim_start_matches('/'))
    }

    pub fn calendar_url(&self) -> String {
        self.web_url(&self.calendar_path)
    }

    pub fn legislation_url(&self) -> String {
        self.web_url(&self.legislation_path)
    }

    pub fn people_url(&self) -> String {
        self.web_url(&self.people_path)
    }
}

/// Logical field names mapped to the literal label text of a deployment.
///
/// Lookups fall back to the platform defaults, then to the logical name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable {
    overrides: IndexMap<String, String>,
}

const DEFAULT_LABELS: &[(&str, &str)] = &[
    ("event.body", "Name"),
    ("event.date", "Meeting Date"),
    ("event.time", "Meeting Time"),
    ("event.location", "Meeting Location"),
    ("event.ical", "iCalendar"),
    ("event.details", "Meeting Details"),
    ("event.agenda", "Agenda"),
    ("event.minutes", "Minutes"),
    ("event.video", "Video"),
    ("person.name", "Person Name"),
    ("person.attendance", "Attendance"),
    ("vote.value", "Vote"),
    ("vote.result", "Result"),
    ("action.date", "Date"),
    ("action.details", "Action Details"),
    ("action.name", "Action"),
    ("action.body", "Action By"),
    ("bill.file", "File #"),
];

impl LabelTable {
    pub fn set(&mut self, logical: impl Into<String>, literal: impl Into<String>) {
        self.overrides.insert(logical.into(), literal.into());
    }

    /// Literal label for a logical field name.
    pub fn get<'a>(&'a self, logical: &'a str) -> &'a str {
        if let Some(literal) = self.overrides.get(logical) {
            return literal;
        }
        DEFAULT_LABELS
            .iter()
            .find(|(k, _)| *k == logical)
            .map(|(_, v)| *v)
            .unwrap_or(logical)
    }
}

/// Session-level knobs shared by every request of a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Requests per minute after each successful request. 0 disables.
    pub requests_per_minute: u32,

    /// Attempts per request, including the first.
    pub retry_attempts: u32,

    /// Fixed delay between attempts, in seconds.
    pub retry_wait_secs: u64,

    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,

    pub user_agent: String,

    /// On-disk response cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            retry_attempts: 3,
            retry_wait_secs: 10,
            timeout_secs: 30,
            user_agent: "legistar-scraper/0.1".to_string(),
            cache_dir: None,
        }
    }
}

impl CrawlSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from `LEGISTAR_*` environment variables, reading `.env`
    /// first when present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            requests_per_minute: env_parse(
                "LEGISTAR_REQUESTS_PER_MINUTE",
                defaults.requests_per_minute,
            )?,
            retry_attempts: env_parse("LEGISTAR_RETRY_ATTEMPTS", defaults.retry_attempts)?,
            retry_wait_secs: env_parse("LEGISTAR_RETRY_WAIT_SECS", defaults.retry_wait_secs)?,
            timeout_secs: env_parse("LEGISTAR_TIMEOUT_SECS", defaults.timeout_secs)?,
            user_agent: env::var("LEGISTAR_USER_AGENT").unwrap_or(defaults.user_agent),
            cache_dir: env::var("LEGISTAR_CACHE_DIR").ok().map(PathBuf::from),
        })
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_retry(mut self, attempts: u32, wait_secs: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_wait_secs = wait_secs;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ScrapeError::Config(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chicago() -> JurisdictionConfig {
        JurisdictionConfig::new(
            "chicago",
            "https://chicago.legistar.com/",
            "https://webapi.legistar.com/v1/chicago",
            "America/Chicago",
        )
    }

    #[test]
    fn test_urls_join_cleanly() {
        let config = chicago();
        assert_eq!(config.calendar_url(), "https://chicago.legistar.com/Calendar.aspx");
        assert_eq!(
            config.api_url("/matters/7/histories"),
            "https://webapi.legistar.com/v1/chicago/matters/7/histories"
        );
    }

    #[test]
    fn test_label_lookup_falls_back() {
        let config = chicago().with_label("event.body", "Meeting Body");
        assert_eq!(config.labels.get("event.body"), "Meeting Body");
        assert_eq!(config.labels.get("event.time"), "Meeting Time");
        assert_eq!(config.labels.get("unheard.of"), "unheard.of");
    }

    #[test]
    fn test_timezone_parse() {
        assert_eq!(chicago().tz().unwrap(), chrono_tz::America::Chicago);

        let mut bad = chicago();
        bad.timezone = "Mars/Olympus".to_string();
        assert!(matches!(bad.tz(), Err(ScrapeError::Timezone(_))));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = r#"{
            "id": "metro",
            "web_base_url": "https://metro.legistar.com",
            "api_base_url": "https://webapi.legistar.com/v1/metro",
            "timezone": "America/Los_Angeles",
            "labels": {"event.body": "Meeting"},
            "reconcile": "calendar_scan"
        }"#;
        let config: JurisdictionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.legislation_path, "Legislation.aspx");
        assert_eq!(config.labels.get("event.body"), "Meeting");
        assert_eq!(config.reconcile, ReconcileMode::CalendarScan);
        assert_eq!(config.event_lookback_hours, 24);
        assert!(config.not_available.iter().any(|s| s == "Not available"));

        let spelled: JurisdictionConfig = serde_json::from_str(
            r#"{
            "id": "metro",
            "web_base_url": "https://metro.legistar.com",
            "api_base_url": "https://webapi.legistar.com/v1/metro",
            "timezone": "America/Los_Angeles",
            "not_available": ["Pending"]
        }"#,
        )
        .unwrap();
        assert_eq!(spelled.not_available, vec!["Pending"]);
    }
}
