//! Vote option and result normalization, and tallies.

use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::info;

use crate::types::records::{Ballot, VoteCount};

const DEFAULT_OPTIONS: &[(&str, &str)] = &[
    ("yes", "yes"),
    ("aye", "yes"),
    ("yea", "yes"),
    ("affirmative", "yes"),
    ("in favor", "yes"),
    ("no", "no"),
    ("nay", "no"),
    ("negative", "no"),
    ("opposed", "no"),
    ("non voting", "not voting"),
    ("not voting", "not voting"),
    ("abstain", "abstain"),
    ("abstained", "abstain"),
    ("abstention", "abstain"),
    ("recused", "excused"),
    ("excused", "excused"),
    ("absent", "absent"),
    ("pass", "pass"),
    ("passed", "pass"),
    ("adopted", "pass"),
    ("approved", "pass"),
    ("carried", "pass"),
    ("fail", "fail"),
    ("failed", "fail"),
    ("defeated", "fail"),
    ("lost", "fail"),
];

/// Free-text vote option or result → canonical value.
#[derive(Debug, Clone)]
pub struct VoteOptionMap {
    map: HashMap<String, String>,
}

impl Default for VoteOptionMap {
    fn default() -> Self {
        Self {
            map: DEFAULT_OPTIONS
                .iter()
                .map(|(raw, option)| (raw.to_string(), option.to_string()))
                .collect(),
        }
    }
}

impl VoteOptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace mappings. Keys are normalized the same way lookups are.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (raw, option) in overrides {
            self.map.insert(fold(raw), option.clone());
        }
        self
    }

    /// Canonical value, or the input unchanged when nothing maps it.
    pub fn normalize(&self, raw: &str) -> String {
        match self.map.get(&fold(raw)) {
            Some(option) => option.clone(),
            None => {
                info!(option = %raw, "Unmapped vote option");
                raw.to_string()
            }
        }
    }
}

fn fold(raw: &str) -> String {
    raw.trim().to_lowercase().replace('-', " ")
}

/// Counts per normalized option, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    counts: IndexMap<String, u32>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, option: &str) {
        *self.counts.entry(option.to_string()).or_insert(0) += 1;
    }

    pub fn from_ballots(ballots: &[Ballot]) -> Self {
        let mut tally = Self::new();
        for ballot in ballots {
            tally.add(&ballot.option);
        }
        tally
    }

    pub fn get(&self, option: &str) -> u32 {
        self.counts.get(option).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn counts(&self) -> Vec<VoteCount> {
        self.counts
            .iter()
            .map(|(option, value)| VoteCount {
                option: option.clone(),
                value: *value,
            })
            .collect()
    }
}
