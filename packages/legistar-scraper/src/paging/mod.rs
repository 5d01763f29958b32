//! Pagination over both interfaces.

pub mod html;
pub mod rest;
pub mod seen;

pub use html::{next_page_target, HtmlPager, PagerState, SEARCH_BUTTON};
pub use rest::{fetch_list, since_filter, RestPager, SearchWindow, PAGE_SIZE};
pub use seen::SeenWindow;
