//! # Legistar Scraper
//!
//! Incremental crawler for municipal legislative systems hosted on the
//! Legistar platform. Two interfaces are read:
//!
//! - the **web interface**: ASP.NET postback pages with paged result grids
//!   and label/value detail pages
//! - the **REST interface**: OData collections of matters, events, votes,
//!   bodies and persons
//!
//! ## Architecture
//!
//! ```text
//! CrawlContext (config, hooks, Fetcher)
//!     │
//!     ├─► PostbackSession ─► HtmlPager ─► extract_table / page_details
//!     │        (web scrapers: WebCalendar, LegislationSearch, CouncilMembers)
//!     │
//!     └─► RestPager ─► normalize::* ─► records::{Bill, Event, Person}
//!              (REST scrapers: ApiBills, ApiEvents, ApiPeople)
//!
//! EventCrawl = ApiEvents + EventReconciler (REST event ↔ web calendar row)
//! ```
//!
//! Every request goes through [`Fetcher`], which applies the rate limit,
//! retries transient failures and optionally caches responses on disk.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use legistar_scraper::{ApiBills, CrawlContext, CrawlSettings, JurisdictionConfig, Registry};
//!
//! let config = JurisdictionConfig::new(
//!     "chicago",
//!     "https://chicago.legistar.com",
//!     "https://webapi.legistar.com/v1/chicago",
//!     "America/Chicago",
//! );
//! let ctx = CrawlContext::connect(config, CrawlSettings::from_env()?, &Registry::new())?;
//!
//! let bills = ApiBills::new(&ctx);
//! let mut matters = bills.search(None);
//! while let Some(matter) = matters.next().await? {
//!     if let Some(bill) = bills.bill(&matter).await? {
//!         println!("{}", serde_json::to_string(&bill)?);
//!     }
//! }
//! ```

pub mod context;
pub mod error;
pub mod extract;
pub mod http;
pub mod ical;
pub mod normalize;
pub mod paging;
pub mod reconcile;
pub mod scrapers;
pub mod session;
pub mod testing;
pub mod traits;
pub mod types;

pub use context::CrawlContext;
pub use error::{DataFault, FetchError, Result, ScrapeError};
pub use http::{DiskCache, Fetcher, RetryPolicy};
pub use paging::{HtmlPager, RestPager, SearchWindow, SeenWindow};
pub use reconcile::{EventMatchKey, EventReconciler};
pub use scrapers::{
    ApiBills, ApiEvents, ApiPeople, CouncilMember, CouncilMembers, EventCrawl, LegislationDetail,
    LegislationSearch, ReconciledEvent, WebCalendar,
};
pub use session::PostbackSession;
pub use traits::{DefaultHooks, JurisdictionHooks, Registry, Transport};
pub use types::config::{CrawlSettings, JurisdictionConfig, LabelTable, ReconcileMode};
pub use types::page::{DetailRecord, FieldMap, FieldValue, Link, Page, TableRow};
pub use types::records::{Bill, Event, Organization, Person, VoteEvent};
