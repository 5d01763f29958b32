//! Typed errors for the scraper library.
//!
//! Three tiers, matching how far a failure is allowed to travel:
//! - [`DataFault`]: a record or page is skipped, the crawl continues.
//! - [`FetchError`]: one request failed for good; the caller decides whether
//!   to skip the record it was fetching.
//! - [`ScrapeError`]: what public scraper operations return.

use thiserror::Error;

/// Errors that end a single request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or timeout failure below HTTP.
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Every attempt in the retry budget failed.
    #[error("gave up on {url} after {attempts} attempts: {reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
        /// Status of the last response, if any attempt got one.
        status: Option<u16>,
    },

    /// The platform reports the record no longer exists.
    #[error("record gone: {url}")]
    Gone { url: String },

    /// An acceptable but unsuccessful status the caller asked to treat as fatal.
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Invalid URL built from configuration or page content.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl FetchError {
    /// HTTP status behind this error, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::RetriesExhausted { status, .. } => *status,
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Gone { .. } => Some(410),
            _ => None,
        }
    }

    /// Forbidden or gone: the record exists but is not visible here.
    pub fn is_restricted(&self) -> bool {
        matches!(self.status(), Some(403) | Some(410))
    }
}

/// Data problems that skip a record or page, never the crawl.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataFault {
    /// The results grid rendered its "no records" row.
    #[error("no records")]
    NoRecords,

    /// A row's cell count disagrees with the header count.
    #[error("row {row} has {found} cells, expected {expected}")]
    CellCount {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Manually entered start time that does not parse.
    #[error("invalid start time {text:?}")]
    StartTime { text: String },

    /// Required field missing from a record.
    #[error("missing field {0}")]
    MissingField(String),
}

/// Errors returned by scraper operations.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// REST query rejected by the server (HTTP 400).
    #[error("bad query: {message}")]
    BadQuery { message: String },

    /// Expected page structure (table, div, control) not found.
    #[error("page structure missing {what} at {url}")]
    MissingStructure { what: String, url: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Data(#[from] DataFault),

    #[error("unknown timezone: {0}")]
    Timezone(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(#[from] std::io::Error),
}

impl ScrapeError {
    pub(crate) fn missing(what: impl Into<String>, url: impl Into<String>) -> Self {
        Self::MissingStructure {
            what: what.into(),
            url: url.into(),
        }
    }
}

/// Result type alias for scraper operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for single requests.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
