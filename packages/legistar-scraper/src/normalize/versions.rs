//! Bill version ranking.

use tracing::debug;

use crate::types::api::{ApiSponsor, ApiVersion};

/// Orders version labels; the highest rank is the latest version.
pub trait VersionRanker: Send + Sync {
    fn rank(&self, version: &str) -> i64;
}

/// Versions are integers (`"0"`, `"1"`, ...). Unparseable labels rank lowest.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericRank;

impl VersionRanker for NumericRank {
    fn rank(&self, version: &str) -> i64 {
        match version.trim().parse::<i64>() {
            Ok(rank) => rank,
            Err(_) => {
                debug!(version = %version, "Non-numeric version label");
                i64::MIN
            }
        }
    }
}

/// Versions ranked by their position in a fixed list, e.g. `["A", "B", "C"]`.
#[derive(Debug, Clone, Default)]
pub struct ListRank {
    order: Vec<String>,
}

impl ListRank {
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: order.into_iter().map(Into::into).collect(),
        }
    }
}

impl VersionRanker for ListRank {
    fn rank(&self, version: &str) -> i64 {
        self.order
            .iter()
            .position(|v| v.eq_ignore_ascii_case(version.trim()))
            .map(|p| p as i64)
            .unwrap_or(i64::MIN)
    }
}

/// The version to report: `explicit` when it names a known version, else the
/// highest ranked one.
pub fn select_version<'a>(
    versions: &'a [ApiVersion],
    explicit: Option<&str>,
    ranker: &dyn VersionRanker,
) -> Option<&'a ApiVersion> {
    if let Some(wanted) = explicit {
        if let Some(version) = versions.iter().find(|v| v.value == wanted) {
            return Some(version);
        }
        debug!(version = %wanted, "Requested version not listed, using latest");
    }
    versions.iter().max_by_key(|v| ranker.rank(&v.value))
}

/// Sponsors of the latest version only, in sponsor sequence order.
pub fn latest_sponsors(sponsors: Vec<ApiSponsor>, ranker: &dyn VersionRanker) -> Vec<ApiSponsor> {
    let Some(max_rank) = sponsors
        .iter()
        .map(|s| ranker.rank(&s.matter_sponsor_matter_version))
        .max()
    else {
        return Vec::new();
    };

    let mut latest: Vec<ApiSponsor> = sponsors
        .into_iter()
        .filter(|s| ranker.rank(&s.matter_sponsor_matter_version) == max_rank)
        .collect();
    latest.sort_by_key(|s| s.matter_sponsor_sequence);
    latest
}
