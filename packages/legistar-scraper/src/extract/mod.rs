//! Structured fields from platform HTML.
//!
//! Extraction is synchronous: parsed documents stay inside these functions
//! and only owned rows and records come out.

pub mod detail;
pub mod links;
pub mod table;
pub mod text;

pub use detail::{extract_details, field_value, page_details, ControlPattern};
pub use links::{build_link, link_address, media_type_for_image, media_type_for_name, postback_target};
pub use table::{extract_rows, extract_table, TableExtraction, ICALENDAR_KEY};
pub use text::element_text;
