//! Fetched pages and the field values extracted from them.

use indexmap::IndexMap;
use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

/// Texts the platform renders in place of a missing value, unless a
/// deployment configures its own.
pub const NOT_AVAILABLE: &[&str] = &["Not available", "Not\u{a0}available", "N/A"];

/// An HTML document plus the URL it was fetched from.
///
/// The body is kept as text; call [`Page::document`] to parse. Parsed
/// documents are not `Send`, so they are built inside synchronous extraction
/// functions and never held across an `.await`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub html: String,
}

impl Page {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Resolve a possibly relative address against this page's URL.
    pub fn resolve(&self, address: &str) -> Option<String> {
        resolve_against(&self.url, address)
    }
}

pub(crate) fn resolve_against(base: &str, address: &str) -> Option<String> {
    let address = address.trim();
    if address.is_empty() {
        return None;
    }
    Url::parse(base)
        .ok()?
        .join(address)
        .ok()
        .map(|u| u.to_string())
}

/// A hyperlink found in a cell or detail field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
    /// MIME type when the link is a document or media file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Link {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            media_type: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// One extracted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Link(Link),
    Links(Vec<Link>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Empty, or one of the default "not available" sentinels.
    pub fn is_blank(&self) -> bool {
        self.is_blank_among(NOT_AVAILABLE)
    }

    /// Empty, or one of `not_available`.
    pub fn is_blank_among<S: AsRef<str>>(&self, not_available: &[S]) -> bool {
        match self {
            FieldValue::Text(t) => is_blank_text(t, not_available),
            FieldValue::Link(link) => link.url.is_empty() && is_blank_text(&link.label, not_available),
            FieldValue::Links(links) => links.is_empty(),
        }
    }

    /// Visible text: the text itself, or the link label(s).
    pub fn label(&self) -> String {
        match self {
            FieldValue::Text(t) => t.clone(),
            FieldValue::Link(link) => link.label.clone(),
            FieldValue::Links(links) => links
                .iter()
                .map(|l| l.label.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// The single link address, if this value is a link.
    pub fn url(&self) -> Option<&str> {
        match self {
            FieldValue::Link(link) => Some(&link.url),
            FieldValue::Links(links) if links.len() == 1 => Some(&links[0].url),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            FieldValue::Link(link) => Some(link),
            FieldValue::Links(links) if links.len() == 1 => links.first(),
            _ => None,
        }
    }

    /// All links, whatever the shape.
    pub fn links(&self) -> Vec<&Link> {
        match self {
            FieldValue::Text(_) => Vec::new(),
            FieldValue::Link(link) => vec![link],
            FieldValue::Links(links) => links.iter().collect(),
        }
    }
}

fn is_blank_text<S: AsRef<str>>(text: &str, not_available: &[S]) -> bool {
    let t = text.trim();
    t.is_empty() || not_available.iter().any(|s| t.eq_ignore_ascii_case(s.as_ref().trim()))
}

/// Normalized label → value, in page order.
pub type DetailRecord = IndexMap<String, FieldValue>;

/// Column header → value, in column order.
pub type TableRow = IndexMap<String, FieldValue>;

/// Convenience lookups shared by rows and detail records.
pub trait FieldMap {
    /// Value under `key` unless empty or one of `not_available`.
    fn present_among<S: AsRef<str>>(&self, key: &str, not_available: &[S]) -> Option<&FieldValue>;

    /// Value under `key` unless blank by the default sentinels.
    fn present(&self, key: &str) -> Option<&FieldValue> {
        self.present_among(key, NOT_AVAILABLE)
    }

    /// Visible text under `key` unless blank by the default sentinels.
    fn text_of(&self, key: &str) -> Option<String> {
        self.present(key).map(|v| v.label())
    }

    fn text_among<S: AsRef<str>>(&self, key: &str, not_available: &[S]) -> Option<String> {
        self.present_among(key, not_available).map(|v| v.label())
    }
}

impl FieldMap for IndexMap<String, FieldValue> {
    fn present_among<S: AsRef<str>>(&self, key: &str, not_available: &[S]) -> Option<&FieldValue> {
        self.get(key).filter(|v| !v.is_blank_among(not_available))
    }
}
