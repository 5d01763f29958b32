//! HTTP plumbing: transport, retry classification, rate limiting, caching.

pub mod cache;
pub mod fetcher;
pub mod retry;
pub mod transport;

pub use cache::DiskCache;
pub use fetcher::{Fetcher, Inspection};
pub use retry::{is_acceptable, is_missing_votes, RetryPolicy, MISSING_VOTES_SIGNATURE};
pub use transport::ReqwestTransport;
