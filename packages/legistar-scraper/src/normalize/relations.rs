//! Related-bill filtering.

use std::collections::HashSet;

use crate::types::api::ApiRelation;
use crate::types::records::RelatedBill;

impl From<&ApiRelation> for RelatedBill {
    fn from(relation: &ApiRelation) -> Self {
        RelatedBill {
            matter_id: relation.matter_relation_matter_id,
            flag: relation.matter_relation_flag,
        }
    }
}

/// Reduces candidate relations to the ones worth reporting.
pub trait RelationFilter: Send + Sync {
    fn filter(&self, relations: Vec<RelatedBill>) -> Vec<RelatedBill>;
}

/// One relation per related bill: the one with the highest flag.
/// Output is ordered by related bill id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestByFlag;

impl RelationFilter for LatestByFlag {
    fn filter(&self, mut relations: Vec<RelatedBill>) -> Vec<RelatedBill> {
        relations.sort_by(|a, b| (b.matter_id, b.flag).cmp(&(a.matter_id, a.flag)));

        let mut seen = HashSet::new();
        let mut kept: Vec<RelatedBill> = relations
            .into_iter()
            .filter(|r| seen.insert(r.matter_id))
            .collect();
        kept.reverse();
        kept
    }
}
