//! Detail pages: label/value controls grouped by their id key.
//!
//! Controls are named `<container><kind><Key><suffix>`, e.g.
//! `ctl00_ContentPlaceHolder1_lblDateX` (the label) followed by
//! `ctl00_ContentPlaceHolder1_lblDate2` (the value). Consecutive controls
//! sharing a key form one field.

use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

use crate::error::{Result, ScrapeError};
use crate::extract::links::build_link;
use crate::extract::text::element_text;
use crate::traits::hooks::FieldExtractor;
use crate::types::page::{DetailRecord, FieldValue, Page};

static A: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("static selector"));

/// Recognized control id prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPattern {
    pub container: String,
    pub kinds: Vec<String>,
}

impl Default for ControlPattern {
    fn default() -> Self {
        Self {
            container: "ctl00_ContentPlaceHolder1_".to_string(),
            kinds: vec!["lbl".to_string(), "hyp".to_string(), "Label".to_string()],
        }
    }
}

/// A parsed control id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub key: String,
    /// Named as a label (`...X`, `...Prompt...`).
    pub is_label: bool,
}

impl ControlPattern {
    pub fn parse(&self, id: &str) -> Option<Control> {
        let rest = id.strip_prefix(self.container.as_str())?;
        let rest = self
            .kinds
            .iter()
            .find_map(|kind| rest.strip_prefix(kind.as_str()))?;

        let is_label = rest.contains("Prompt") || rest.ends_with('X');
        let key = rest
            .split("Prompt")
            .next()
            .unwrap_or(rest)
            .trim_end_matches(['X', '2', '1']);
        if key.is_empty() {
            return None;
        }
        Some(Control {
            key: key.to_string(),
            is_label,
        })
    }
}

struct Group<'a> {
    key: String,
    label: Option<ElementRef<'a>>,
    values: Vec<ElementRef<'a>>,
}

/// Group the controls under `scope` into label → value.
pub fn extract_details(
    scope: ElementRef<'_>,
    base: &str,
    pattern: &ControlPattern,
    extractor: &dyn FieldExtractor,
) -> DetailRecord {
    let mut groups: Vec<Group<'_>> = Vec::new();

    for el in scope.descendants().filter_map(ElementRef::wrap) {
        let Some(control) = el.value().id().and_then(|id| pattern.parse(id)) else {
            continue;
        };
        let is_label = control.is_label || element_text(el).ends_with(':');

        let starts_group = match groups.last() {
            None => true,
            Some(group) => {
                group.key != control.key
                    || (is_label && (group.label.is_some() || !group.values.is_empty()))
            }
        };
        if starts_group {
            groups.push(Group {
                key: control.key,
                label: None,
                values: Vec::new(),
            });
        }

        let Some(group) = groups.last_mut() else {
            continue;
        };
        if is_label {
            group.label = Some(el);
        } else {
            group.values.push(el);
        }
    }

    groups
        .into_iter()
        .map(|group| finish(group, base, extractor))
        .collect()
}

fn finish(group: Group<'_>, base: &str, extractor: &dyn FieldExtractor) -> (String, FieldValue) {
    let label = group
        .label
        .map(|el| element_text(el).trim_end_matches(':').trim().to_string())
        .filter(|label| !label.is_empty())
        .unwrap_or(group.key);

    let Some(value) = group.values.last().copied() else {
        return (label, FieldValue::Text(String::new()));
    };

    if let Some(custom) = extractor.extract(&label, value, base) {
        return (label, custom);
    }
    (label, field_value(value, base))
}

/// Generic value rules: a link control is a link, a control holding links is
/// a list of links, anything else is text.
pub fn field_value(value: ElementRef<'_>, base: &str) -> FieldValue {
    let attrs = value.value();
    if attrs.attr("href").is_some() || attrs.attr("onclick").is_some() {
        if let Some(link) = build_link(value, value, base) {
            return FieldValue::Link(link);
        }
    }

    let links: Vec<_> = value
        .select(&A)
        .filter_map(|anchor| build_link(anchor, anchor, base))
        .collect();
    if !links.is_empty() {
        return FieldValue::Links(links);
    }
    FieldValue::Text(element_text(value))
}

/// Detail fields inside the div with id `div_id`.
pub fn page_details(page: &Page, div_id: &str, extractor: &dyn FieldExtractor) -> Result<DetailRecord> {
    let document = page.document();
    let selector = Selector::parse(&format!("div[id='{}']", div_id))
        .map_err(|_| ScrapeError::Config(format!("invalid div id {:?}", div_id)))?;
    let scope = document
        .select(&selector)
        .next()
        .ok_or_else(|| ScrapeError::missing(format!("div {}", div_id), &page.url))?;

    Ok(extract_details(scope, &page.url, &ControlPattern::default(), extractor))
}
