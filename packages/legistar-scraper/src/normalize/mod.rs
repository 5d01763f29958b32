//! Domain normalizers applied to raw records before assembly.

pub mod actions;
pub mod relations;
pub mod versions;
pub mod votes;

pub use actions::{clean_history, dedupe_adjacent};
pub use relations::{LatestByFlag, RelationFilter};
pub use versions::{latest_sponsors, select_version, ListRank, NumericRank, VersionRanker};
pub use votes::{VoteOptionMap, VoteTally};
