//! Results grids: header cells matched positionally to row cells.

use scraper::{ElementRef, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::error::{DataFault, Result, ScrapeError};
use crate::extract::links::build_link;
use crate::extract::text::element_text;
use crate::types::page::{FieldValue, Page, TableRow};

static TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").expect("static selector"));
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static A: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("static selector"));
static INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[value]").expect("static selector"));
static IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[alt]").expect("static selector"));

/// Key given to calendar-attachment links in blank or `ics` columns.
pub const ICALENDAR_KEY: &str = "iCalendar";

const ROW_CLASSES: &[&str] = &["rgRow", "rgAltRow", "rgNoRecords"];

/// Rows of one page's grid, plus why extraction stopped early, if it did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableExtraction {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
    pub stop: Option<DataFault>,
}

impl TableExtraction {
    /// The grid said the query matched nothing.
    pub fn is_no_records(&self) -> bool {
        self.stop == Some(DataFault::NoRecords)
    }
}

/// Extract the grid whose `id` is `table_id`.
pub fn extract_table(page: &Page, table_id: &str, no_records_marker: &str) -> Result<TableExtraction> {
    let document = page.document();
    let selector = Selector::parse(&format!("table[id='{}']", table_id))
        .map_err(|_| ScrapeError::Config(format!("invalid table id {:?}", table_id)))?;
    let table = document
        .select(&selector)
        .next()
        .ok_or_else(|| ScrapeError::missing(format!("table {}", table_id), &page.url))?;

    Ok(extract_rows(table, &page.url, no_records_marker))
}

/// Extract rows from a grid element already located.
pub fn extract_rows(table: ElementRef<'_>, base: &str, no_records_marker: &str) -> TableExtraction {
    let headers: Vec<String> = table
        .select(&TH)
        .filter(|th| has_class_prefix(*th, "rgHeader"))
        .map(header_text)
        .collect();

    let mut extraction = TableExtraction {
        headers,
        ..Default::default()
    };

    let rows = table.select(&TR).filter(|tr| {
        tr.value()
            .classes()
            .any(|class| ROW_CLASSES.contains(&class))
    });

    for (index, row) in rows.enumerate() {
        if element_text(row).contains(no_records_marker) {
            debug!(url = %base, "Grid has no records");
            extraction.stop = Some(DataFault::NoRecords);
            break;
        }

        let cells: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect();

        if cells.len() != extraction.headers.len() {
            let fault = DataFault::CellCount {
                row: index,
                expected: extraction.headers.len(),
                found: cells.len(),
            };
            warn!(url = %base, error = %fault, "Abandoning page");
            extraction.stop = Some(fault);
            break;
        }

        let mut record = TableRow::new();
        for (header, cell) in extraction.headers.iter().zip(cells) {
            let (key, value) = cell_value(header, cell, base);
            record.insert(key, value);
        }
        extraction.rows.push(record);
    }

    extraction
}

fn has_class_prefix(el: ElementRef<'_>, prefix: &str) -> bool {
    el.value().classes().any(|class| class.starts_with(prefix))
}

/// Header text, else the value of an input (sort buttons), else an image's
/// alt text.
fn header_text(th: ElementRef<'_>) -> String {
    let text = element_text(th);
    if !text.is_empty() {
        return text;
    }
    th.select(&INPUT)
        .filter_map(|input| input.value().attr("value"))
        .chain(th.select(&IMG).filter_map(|img| img.value().attr("alt")))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn cell_value(header: &str, cell: ElementRef<'_>, base: &str) -> (String, FieldValue) {
    let link = cell
        .select(&A)
        .next()
        .and_then(|anchor| build_link(anchor, cell, base));

    let Some(mut link) = link else {
        return (header.to_string(), FieldValue::Text(element_text(cell)));
    };

    let blank_header = header.trim().is_empty() || header.trim().eq_ignore_ascii_case("ics");
    if blank_header && link.url.contains("View.ashx?M=IC") {
        if link.label.is_empty() {
            link.label = ICALENDAR_KEY.to_string();
        }
        return (ICALENDAR_KEY.to_string(), FieldValue::Link(link));
    }

    if link.label.is_empty() {
        link.label = element_text(cell);
    }
    (header.to_string(), FieldValue::Link(link))
}
