//! Data types for the scraper library.

pub mod api;
pub mod config;
pub mod page;
pub mod records;
