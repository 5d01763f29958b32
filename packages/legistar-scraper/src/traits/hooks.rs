//! Per-jurisdiction override points.
//!
//! Deployments differ in small ways: version labels, which sponsors are real
//! people, how motions are worded. Each difference is a default method on
//! [`JurisdictionHooks`]; a jurisdiction overrides only what it needs and is
//! registered by id in a [`Registry`].

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use scraper::ElementRef;
use std::collections::HashMap;
use std::sync::Arc;

use crate::normalize::{LatestByFlag, NumericRank, RelationFilter, VersionRanker};
use crate::types::api::{ApiEvent, ApiSponsor};
use crate::types::page::FieldValue;

/// Custom extraction for detail fields the generic rules get wrong.
pub trait FieldExtractor: Send + Sync {
    /// Value for the field labelled `label`, or `None` to use the generic
    /// rules.
    fn extract(&self, label: &str, value: ElementRef<'_>, base: &str) -> Option<FieldValue>;
}

/// The generic rules only.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericFields;

impl FieldExtractor for GenericFields {
    fn extract(&self, _label: &str, _value: ElementRef<'_>, _base: &str) -> Option<FieldValue> {
        None
    }
}

const MOTION_CLASSES: &[(&str, &str)] = &[
    ("override", "veto-override"),
    ("amend", "amendment"),
    ("refer", "referral"),
    ("pass", "passage"),
    ("adopt", "passage"),
    ("approv", "passage"),
];

/// Everything a jurisdiction may override.
pub trait JurisdictionHooks: Send + Sync {
    fn version_ranker(&self) -> &dyn VersionRanker {
        &NumericRank
    }

    fn relation_filter(&self) -> &dyn RelationFilter {
        &LatestByFlag
    }

    fn field_extractor(&self) -> &dyn FieldExtractor {
        &GenericFields
    }

    /// Extra vote option mappings, applied over the configured ones.
    fn vote_options(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Drop a sponsor entry (e.g. placeholder names).
    fn drop_sponsor(&self, _sponsor: &ApiSponsor) -> bool {
        false
    }

    /// Drop an organization by name (e.g. administrative bodies).
    fn drop_organization(&self, _name: &str) -> bool {
        false
    }

    /// Classification labels for a motion or action text.
    fn classify_motion(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        MOTION_CLASSES
            .iter()
            .find(|(needle, _)| lowered.contains(needle))
            .map(|(_, class)| vec![class.to_string()])
            .unwrap_or_default()
    }

    /// Events the REST interface has but the web interface never shows.
    fn not_in_web_interface(&self, _event: &ApiEvent) -> bool {
        false
    }

    /// Status of an event starting at `start`.
    fn event_status(&self, start: &DateTime<Tz>, now: &DateTime<Utc>, _event: &ApiEvent) -> String {
        if start.with_timezone(&Utc) < *now {
            "passed".to_string()
        } else {
            "confirmed".to_string()
        }
    }
}

/// Hooks with every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl JurisdictionHooks for DefaultHooks {}

/// Jurisdiction id → hooks.
#[derive(Clone, Default)]
pub struct Registry {
    hooks: HashMap<String, Arc<dyn JurisdictionHooks>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, hooks: Arc<dyn JurisdictionHooks>) -> Self {
        self.register(id, hooks);
        self
    }

    pub fn register(&mut self, id: impl Into<String>, hooks: Arc<dyn JurisdictionHooks>) {
        self.hooks.insert(id.into(), hooks);
    }

    /// Hooks for `id`, or the defaults.
    pub fn get(&self, id: &str) -> Arc<dyn JurisdictionHooks> {
        self.hooks
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::new(DefaultHooks))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.hooks.contains_key(id)
    }
}
