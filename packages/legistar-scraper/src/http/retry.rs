//! Retry policy: which responses are final, and how long to keep trying.

use std::time::Duration;

use crate::traits::transport::HttpResponse;

/// Body signature of the votes endpoint when a roll call has no individual
/// ballots. Permanent: the server answers 500 every time.
pub const MISSING_VOTES_SIGNATURE: &str = "The cast to value type 'System.Int32' failed because the materialized value is null";

/// Fixed-budget, fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first. At least 1.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// No retries, no delay.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Whether a response ends the retry loop.
///
/// Acceptable: anything below 401, 410 (confirmed absent), and a 500 that
/// carries the missing-votes signature. Everything else is retried.
pub fn is_acceptable(response: &HttpResponse) -> bool {
    match response.status {
        s if s < 401 => true,
        410 => true,
        500 => is_missing_votes(response),
        _ => false,
    }
}

/// The votes endpoint's permanent 500.
pub fn is_missing_votes(response: &HttpResponse) -> bool {
    response.status == 500 && response.body.contains(MISSING_VOTES_SIGNATURE)
}
