//! Patch-mode coverage tracking for the reinforcement pass.
//!
//! The pass must cover the full (capability x form) cross-product. The
//! merge keeps the first entry seen for each pair; follow-up responses only
//! fill gaps and can never overwrite accepted entries.

use std::collections::{BTreeMap, BTreeSet};

use super::schema::{BehaviorForm, ReinforcementEntry};

/// Maximum follow-up requests for missing pairs after the first response.
pub const PATCH_FOLLOWUP_LIMIT: usize = 3;

/// One (capability id, form) pair.
pub type CoverageKey = (String, BehaviorForm);

/// The full cross-product a reinforcement run must cover.
pub fn coverage_targets(capability_ids: &[String]) -> BTreeSet<CoverageKey> {
    capability_ids
        .iter()
        .flat_map(|cap| {
            BehaviorForm::ALL
                .iter()
                .map(move |form| (cap.clone(), *form))
        })
        .collect()
}

/// Accumulates reinforcement entries across the initial response and its
/// follow-ups, keyed by (capability, form).
#[derive(Debug, Default)]
pub struct CoverageMerge {
    entries: BTreeMap<CoverageKey, ReinforcementEntry>,
}

impl CoverageMerge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a response's entries. First entry per key wins; duplicates
    /// within or across responses are dropped.
    pub fn absorb(&mut self, entries: Vec<ReinforcementEntry>) {
        for entry in entries {
            let key = (entry.capability_ref.clone(), entry.form);
            self.entries.entry(key).or_insert(entry);
        }
    }

    /// Pairs from `targets` not yet covered, in deterministic order.
    pub fn missing(&self, targets: &BTreeSet<CoverageKey>) -> Vec<CoverageKey> {
        targets
            .iter()
            .filter(|key| !self.entries.contains_key(*key))
            .cloned()
            .collect()
    }

    pub fn covered_count(&self) -> usize {
        self.entries.len()
    }

    /// Consume the merge once coverage is exact.
    pub fn into_entries(self) -> BTreeMap<CoverageKey, ReinforcementEntry> {
        self.entries
    }
}
