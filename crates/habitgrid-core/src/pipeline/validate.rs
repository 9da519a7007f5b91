//! Schema validators for pipeline passes.
//!
//! Pure functions checking cardinality, id cross-references, step prefixes,
//! and banned content. Numeric range handling is deliberately NOT here:
//! out-of-range numbers are clamped during assembly rather than rejected,
//! so a validator never fails a pass over a number.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::map::{HabitMap, RouteTag, STAGE_COUNT, STAGE_PREFIXES};
use crate::map::{ACTION_SECONDS_RANGE, REQUIRED_COMPLETIONS_RANGE, SUCCESS_PROBABILITY_RANGE};

use super::schema::{
    BehaviorsPayload, CapabilitiesPayload, NormalizePayload, RecoveryPayload, ReinforcementEntry,
    StagesPayload,
};

/// Minimum cardinalities enforced per pass.
pub const MIN_CAPABILITIES: usize = 3;
pub const MIN_LEVERAGE_POINTS: usize = 3;
pub const MIN_BEHAVIORS: usize = 3;
pub const MIN_INTERVENTIONS: usize = 4;
pub const MIN_INTERVENTION_VARIANTS: usize = 2;
pub const MIN_RECOVERY_SCRIPTS: usize = 2;
pub const MIN_FRICTIONS: usize = 3;
pub const MIN_ROUTE_ENTRIES: usize = 3;

/// Substrings rejected anywhere in generated text: metric/cadence framing
/// and template boilerplate that never belongs in a user-facing action.
pub const BANNED_SUBSTRINGS: &[&str] = &[
    "kpi",
    "okr",
    "streak",
    "every single day",
    "no excuses",
    "% improvement",
    "x% ",
    "as an ai",
    "as a language model",
    "lorem ipsum",
    "placeholder",
    "[insert",
    "<insert",
    "{goal}",
    "{user}",
    "tbd",
];

/// Why a pass response was rejected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{what}: expected at least {min}, got {got}")]
    TooFew {
        what: &'static str,
        min: usize,
        got: usize,
    },

    #[error("duplicate id {0:?}")]
    DuplicateId(String),

    #[error("{field} references unknown id {id:?}")]
    UnresolvedReference { field: &'static str, id: String },

    #[error("capability {0:?} has no behavior")]
    UncoveredCapability(String),

    #[error("stage index set must be exactly 0..=4, found {found:?}")]
    BadStageIndexSet { found: Vec<i64> },

    #[error("step {step_id:?} must start with {expected:?} for stage {stage}")]
    StepPrefixMismatch {
        step_id: String,
        stage: u8,
        expected: char,
    },

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("banned phrase {needle:?} in {text:?}")]
    BannedContent { needle: &'static str, text: String },

    #[error("missing route entry tagged {0:?}")]
    MissingRouteTag(&'static str),

    #[error("{field} value {value} is outside {lo}..={hi}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        lo: f64,
        hi: f64,
    },
}

/// Ids accumulated across passes, used to resolve cross-references.
///
/// Every "referenced id" field must resolve to an id defined by an earlier
/// pass; an unresolved reference is a hard validation failure.
#[derive(Debug, Clone, Default)]
pub struct IdTable {
    pub capabilities: BTreeSet<String>,
    pub leverage_points: BTreeSet<String>,
    pub behaviors: BTreeSet<String>,
    pub steps: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Banned-content scan
// ---------------------------------------------------------------------------

/// Scan one text field for banned substrings (case-insensitive).
pub fn scan_banned(text: &str) -> Result<(), ValidationError> {
    let lowered = text.to_lowercase();
    for needle in BANNED_SUBSTRINGS {
        if lowered.contains(needle) {
            return Err(ValidationError::BannedContent {
                needle,
                text: text.to_string(),
            });
        }
    }
    Ok(())
}

/// Scan the concatenation of many text fields.
fn scan_all<'a>(fields: impl IntoIterator<Item = &'a str>) -> Result<(), ValidationError> {
    for field in fields {
        scan_banned(field)?;
    }
    Ok(())
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-pass validators
// ---------------------------------------------------------------------------

pub fn validate_normalize(p: &NormalizePayload) -> Result<(), ValidationError> {
    require_non_empty("mastery_definition", &p.mastery_definition)?;
    if p.frictions.len() < MIN_FRICTIONS {
        return Err(ValidationError::TooFew {
            what: "frictions",
            min: MIN_FRICTIONS,
            got: p.frictions.len(),
        });
    }
    if p.method_route.len() < MIN_ROUTE_ENTRIES {
        return Err(ValidationError::TooFew {
            what: "method_route",
            min: MIN_ROUTE_ENTRIES,
            got: p.method_route.len(),
        });
    }
    scan_all(
        std::iter::once(p.mastery_definition.as_str())
            .chain(p.frictions.iter().map(String::as_str))
            .chain(p.method_route.iter().map(String::as_str)),
    )
}

pub fn validate_capabilities(p: &CapabilitiesPayload) -> Result<(), ValidationError> {
    if p.capabilities.len() < MIN_CAPABILITIES {
        return Err(ValidationError::TooFew {
            what: "capabilities",
            min: MIN_CAPABILITIES,
            got: p.capabilities.len(),
        });
    }
    if p.leverage_points.len() < MIN_LEVERAGE_POINTS {
        return Err(ValidationError::TooFew {
            what: "leverage_points",
            min: MIN_LEVERAGE_POINTS,
            got: p.leverage_points.len(),
        });
    }

    let mut seen = BTreeSet::new();
    for cap in &p.capabilities {
        require_non_empty("capability.id", &cap.id)?;
        require_non_empty("capability.name", &cap.name)?;
        if !seen.insert(cap.id.as_str()) {
            return Err(ValidationError::DuplicateId(cap.id.clone()));
        }
    }
    let mut lev_seen = BTreeSet::new();
    for lev in &p.leverage_points {
        require_non_empty("leverage.id", &lev.id)?;
        if !lev_seen.insert(lev.id.as_str()) {
            return Err(ValidationError::DuplicateId(lev.id.clone()));
        }
        if !seen.contains(lev.capability_ref.as_str()) {
            return Err(ValidationError::UnresolvedReference {
                field: "leverage.capability_ref",
                id: lev.capability_ref.clone(),
            });
        }
    }

    scan_all(
        p.capabilities
            .iter()
            .flat_map(|c| [c.name.as_str(), c.summary.as_str()])
            .chain(p.leverage_points.iter().map(|l| l.text.as_str())),
    )
}

pub fn validate_stages(p: &StagesPayload, ids: &IdTable) -> Result<(), ValidationError> {
    // The stage index set must be exactly {0,1,2,3,4}.
    let mut found: Vec<i64> = p.stages.iter().map(|s| s.index).collect();
    found.sort_unstable();
    let expected: Vec<i64> = (0..STAGE_COUNT as i64).collect();
    if found != expected {
        return Err(ValidationError::BadStageIndexSet { found });
    }

    let mut step_seen = BTreeSet::new();
    for stage in &p.stages {
        if stage.steps.is_empty() {
            return Err(ValidationError::TooFew {
                what: "stage.steps",
                min: 1,
                got: 0,
            });
        }
        let expected_prefix = STAGE_PREFIXES[stage.index as usize];
        for step in &stage.steps {
            require_non_empty("step.step_id", &step.step_id)?;
            require_non_empty("step.title", &step.title)?;
            if !step_seen.insert(step.step_id.as_str()) {
                return Err(ValidationError::DuplicateId(step.step_id.clone()));
            }
            if step.step_id.chars().next() != Some(expected_prefix) {
                return Err(ValidationError::StepPrefixMismatch {
                    step_id: step.step_id.clone(),
                    stage: stage.index as u8,
                    expected: expected_prefix,
                });
            }
            if !ids.capabilities.contains(step.capability_ref.as_str()) {
                return Err(ValidationError::UnresolvedReference {
                    field: "step.capability_ref",
                    id: step.capability_ref.clone(),
                });
            }
        }
    }

    scan_all(p.stages.iter().flat_map(|s| {
        s.steps
            .iter()
            .flat_map(|st| [st.title.as_str(), st.fallback.as_str(), st.category.as_str()])
    }))
}

pub fn validate_behaviors(p: &BehaviorsPayload, ids: &IdTable) -> Result<(), ValidationError> {
    if p.behaviors.len() < MIN_BEHAVIORS {
        return Err(ValidationError::TooFew {
            what: "behaviors",
            min: MIN_BEHAVIORS,
            got: p.behaviors.len(),
        });
    }

    let mut seen = BTreeSet::new();
    let mut covered = BTreeSet::new();
    for behavior in &p.behaviors {
        require_non_empty("behavior.id", &behavior.id)?;
        require_non_empty("behavior.description", &behavior.description)?;
        if !seen.insert(behavior.id.as_str()) {
            return Err(ValidationError::DuplicateId(behavior.id.clone()));
        }
        if !ids.capabilities.contains(behavior.capability_ref.as_str()) {
            return Err(ValidationError::UnresolvedReference {
                field: "behavior.capability_ref",
                id: behavior.capability_ref.clone(),
            });
        }
        if let Some(lev) = &behavior.leverage_ref {
            if !ids.leverage_points.contains(lev.as_str()) {
                return Err(ValidationError::UnresolvedReference {
                    field: "behavior.leverage_ref",
                    id: lev.clone(),
                });
            }
        }
        covered.insert(behavior.capability_ref.as_str());
    }

    // Every capability needs at least one behavior.
    for cap in &ids.capabilities {
        if !covered.contains(cap.as_str()) {
            return Err(ValidationError::UncoveredCapability(cap.clone()));
        }
    }

    scan_all(p.behaviors.iter().map(|b| b.description.as_str()))
}

/// Per-entry validation for the reinforcement pass. Coverage of the
/// (capability x form) cross-product is checked separately in patch mode.
pub fn validate_reinforcement_entries(
    entries: &[ReinforcementEntry],
    ids: &IdTable,
) -> Result<(), ValidationError> {
    for entry in entries {
        require_non_empty("entry.text", &entry.text)?;
        require_non_empty("entry.completion_signal", &entry.completion_signal)?;
        if !ids.capabilities.contains(entry.capability_ref.as_str()) {
            return Err(ValidationError::UnresolvedReference {
                field: "entry.capability_ref",
                id: entry.capability_ref.clone(),
            });
        }
        if let Some(beh) = &entry.behavior_ref {
            if !ids.behaviors.contains(beh.as_str()) {
                return Err(ValidationError::UnresolvedReference {
                    field: "entry.behavior_ref",
                    id: beh.clone(),
                });
            }
        }
        scan_banned(&entry.text)?;
        scan_banned(&entry.completion_signal)?;
    }
    Ok(())
}

pub fn validate_recovery(p: &RecoveryPayload, ids: &IdTable) -> Result<(), ValidationError> {
    if p.interventions.len() < MIN_INTERVENTIONS {
        return Err(ValidationError::TooFew {
            what: "interventions",
            min: MIN_INTERVENTIONS,
            got: p.interventions.len(),
        });
    }
    require_non_empty("progressive_strategy", &p.progressive_strategy)?;
    require_non_empty("low_effort_variant", &p.low_effort_variant)?;
    require_non_empty("interruption_recovery", &p.interruption_recovery)?;

    let mut seen = BTreeSet::new();
    for intervention in &p.interventions {
        require_non_empty("intervention.id", &intervention.id)?;
        require_non_empty("intervention.trigger", &intervention.trigger)?;
        if !seen.insert(intervention.id.as_str()) {
            return Err(ValidationError::DuplicateId(intervention.id.clone()));
        }
        if intervention.variants.len() < MIN_INTERVENTION_VARIANTS {
            return Err(ValidationError::TooFew {
                what: "intervention.variants",
                min: MIN_INTERVENTION_VARIANTS,
                got: intervention.variants.len(),
            });
        }
        if intervention.recovery_scripts.len() < MIN_RECOVERY_SCRIPTS {
            return Err(ValidationError::TooFew {
                what: "intervention.recovery_scripts",
                min: MIN_RECOVERY_SCRIPTS,
                got: intervention.recovery_scripts.len(),
            });
        }
        if let Some(cap) = &intervention.capability_ref {
            if !ids.capabilities.contains(cap.as_str()) {
                return Err(ValidationError::UnresolvedReference {
                    field: "intervention.capability_ref",
                    id: cap.clone(),
                });
            }
        }
        if let Some(beh) = &intervention.behavior_ref {
            if !ids.behaviors.contains(beh.as_str()) {
                return Err(ValidationError::UnresolvedReference {
                    field: "intervention.behavior_ref",
                    id: beh.clone(),
                });
            }
        }
    }

    scan_all(
        p.interventions
            .iter()
            .flat_map(|i| {
                std::iter::once(i.trigger.as_str())
                    .chain(i.variants.iter().map(String::as_str))
                    .chain(i.recovery_scripts.iter().map(String::as_str))
            })
            .chain([
                p.progressive_strategy.as_str(),
                p.low_effort_variant.as_str(),
                p.interruption_recovery.as_str(),
            ]),
    )
}

// ---------------------------------------------------------------------------
// Final map gate
// ---------------------------------------------------------------------------

/// Validate a fully assembled map before it is handed to the caller.
///
/// Assembly clamps every numeric field, so a range violation here means an
/// assembly bug rather than bad generated content.
pub fn validate_map(map: &HabitMap) -> Result<(), ValidationError> {
    require_non_empty("mastery_definition", &map.mastery_definition)?;
    if map.frictions.len() < MIN_FRICTIONS {
        return Err(ValidationError::TooFew {
            what: "frictions",
            min: MIN_FRICTIONS,
            got: map.frictions.len(),
        });
    }
    if map.method_route.len() < MIN_ROUTE_ENTRIES {
        return Err(ValidationError::TooFew {
            what: "method_route",
            min: MIN_ROUTE_ENTRIES,
            got: map.method_route.len(),
        });
    }
    for tag in RouteTag::ALL {
        if !map.method_route.iter().any(|e| e.tag == Some(tag)) {
            return Err(ValidationError::MissingRouteTag(match tag {
                RouteTag::ProgressiveStrategy => "progressive_strategy",
                RouteTag::LowEffortVariant => "low_effort_variant",
                RouteTag::InterruptionRecovery => "interruption_recovery",
            }));
        }
    }

    let mut found: Vec<i64> = map.stages.iter().map(|s| s.index as i64).collect();
    found.sort_unstable();
    if found != (0..STAGE_COUNT as i64).collect::<Vec<_>>() {
        return Err(ValidationError::BadStageIndexSet { found });
    }

    let mut step_seen = BTreeSet::new();
    for stage in &map.stages {
        if stage.steps.is_empty() {
            return Err(ValidationError::TooFew {
                what: "stage.steps",
                min: 1,
                got: 0,
            });
        }
        let expected = STAGE_PREFIXES[stage.index as usize];
        for step in &stage.steps {
            if !step_seen.insert(step.step_id.as_str()) {
                return Err(ValidationError::DuplicateId(step.step_id.clone()));
            }
            if step.step_id.chars().next() != Some(expected) {
                return Err(ValidationError::StepPrefixMismatch {
                    step_id: step.step_id.clone(),
                    stage: stage.index,
                    expected,
                });
            }
            require_non_empty("step.fallback", &step.fallback)?;
            check_range(
                "step.required_completions",
                step.required_completions as f64,
                REQUIRED_COMPLETIONS_RANGE.0 as f64,
                REQUIRED_COMPLETIONS_RANGE.1 as f64,
            )?;
            if step.actions.is_empty() {
                return Err(ValidationError::TooFew {
                    what: "step.actions",
                    min: 1,
                    got: 0,
                });
            }
            for action in &step.actions {
                require_non_empty("action.text", &action.text)?;
                scan_banned(&action.text)?;
                check_range(
                    "action.estimated_seconds",
                    action.estimated_seconds as f64,
                    ACTION_SECONDS_RANGE.0 as f64,
                    ACTION_SECONDS_RANGE.1 as f64,
                )?;
                check_range(
                    "action.success_probability",
                    action.success_probability as f64,
                    SUCCESS_PROBABILITY_RANGE.0 as f64,
                    SUCCESS_PROBABILITY_RANGE.1 as f64,
                )?;
            }
        }
    }

    Ok(())
}

fn check_range(field: &'static str, value: f64, lo: f64, hi: f64) -> Result<(), ValidationError> {
    if value < lo || value > hi {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            lo,
            hi,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::{
        BehaviorPayload, CapabilityPayload, InterventionPayload, LeveragePayload, StagePayload,
        StepPayload,
    };

    fn capability(id: &str) -> CapabilityPayload {
        CapabilityPayload {
            id: id.to_string(),
            name: format!("capability {id}"),
            summary: "a concrete skill".to_string(),
        }
    }

    fn leverage(id: &str, cap: &str) -> LeveragePayload {
        LeveragePayload {
            id: id.to_string(),
            capability_ref: cap.to_string(),
            text: "a useful anchor moment".to_string(),
        }
    }

    fn valid_capabilities() -> CapabilitiesPayload {
        CapabilitiesPayload {
            capabilities: vec![capability("cap-1"), capability("cap-2"), capability("cap-3")],
            leverage_points: vec![
                leverage("lev-1", "cap-1"),
                leverage("lev-2", "cap-2"),
                leverage("lev-3", "cap-3"),
            ],
        }
    }

    fn ids_with_caps() -> IdTable {
        let mut ids = IdTable::default();
        for c in ["cap-1", "cap-2", "cap-3"] {
            ids.capabilities.insert(c.to_string());
        }
        for l in ["lev-1", "lev-2", "lev-3"] {
            ids.leverage_points.insert(l.to_string());
        }
        ids
    }

    fn step(id: &str, cap: &str) -> StepPayload {
        StepPayload {
            step_id: id.to_string(),
            title: format!("step {id}"),
            duration_estimate: "5 min".to_string(),
            fallback: "a smaller version".to_string(),
            category: "practice".to_string(),
            required_completions: 2,
            capability_ref: cap.to_string(),
        }
    }

    fn valid_stages() -> StagesPayload {
        StagesPayload {
            stages: vec![
                StagePayload { index: 0, steps: vec![step("S1", "cap-1")] },
                StagePayload { index: 1, steps: vec![step("P1", "cap-1")] },
                StagePayload { index: 2, steps: vec![step("L1", "cap-2")] },
                StagePayload { index: 3, steps: vec![step("B1", "cap-2")] },
                StagePayload { index: 4, steps: vec![step("R1", "cap-3")] },
            ],
        }
    }

    #[test]
    fn banned_scan_is_case_insensitive() {
        assert!(scan_banned("Track your KPI dashboard").is_err());
        assert!(scan_banned("walk to the mailbox").is_ok());
    }

    #[test]
    fn normalize_requires_three_frictions() {
        let p = NormalizePayload {
            mastery_definition: "paint confidently".to_string(),
            frictions: vec!["tired".into(), "busy".into()],
            method_route: vec!["a".into(), "b".into(), "c".into()],
        };
        assert!(matches!(
            validate_normalize(&p),
            Err(ValidationError::TooFew { what: "frictions", .. })
        ));
    }

    #[test]
    fn capabilities_validates_cleanly() {
        assert!(validate_capabilities(&valid_capabilities()).is_ok());
    }

    #[test]
    fn duplicate_capability_id_rejected() {
        let mut p = valid_capabilities();
        p.capabilities[2].id = "cap-1".to_string();
        assert!(matches!(
            validate_capabilities(&p),
            Err(ValidationError::DuplicateId(id)) if id == "cap-1"
        ));
    }

    #[test]
    fn leverage_must_reference_defined_capability() {
        let mut p = valid_capabilities();
        p.leverage_points[0].capability_ref = "cap-99".to_string();
        assert!(matches!(
            validate_capabilities(&p),
            Err(ValidationError::UnresolvedReference { id, .. }) if id == "cap-99"
        ));
    }

    #[test]
    fn stages_accept_exact_index_set() {
        assert!(validate_stages(&valid_stages(), &ids_with_caps()).is_ok());
    }

    #[test]
    fn missing_stage_index_rejected() {
        let mut p = valid_stages();
        p.stages.remove(2);
        assert!(matches!(
            validate_stages(&p, &ids_with_caps()),
            Err(ValidationError::BadStageIndexSet { .. })
        ));
    }

    #[test]
    fn duplicate_stage_index_rejected() {
        let mut p = valid_stages();
        p.stages[4].index = 3;
        p.stages[4].steps = vec![step("B2", "cap-1")];
        assert!(matches!(
            validate_stages(&p, &ids_with_caps()),
            Err(ValidationError::BadStageIndexSet { .. })
        ));
    }

    #[test]
    fn step_prefix_must_match_stage() {
        let mut p = valid_stages();
        p.stages[0].steps[0].step_id = "P9".to_string();
        assert!(matches!(
            validate_stages(&p, &ids_with_caps()),
            Err(ValidationError::StepPrefixMismatch { expected: 'S', .. })
        ));
    }

    #[test]
    fn step_capability_must_resolve() {
        let mut p = valid_stages();
        p.stages[1].steps[0].capability_ref = "cap-404".to_string();
        assert!(matches!(
            validate_stages(&p, &ids_with_caps()),
            Err(ValidationError::UnresolvedReference { id, .. }) if id == "cap-404"
        ));
    }

    #[test]
    fn behaviors_must_cover_every_capability() {
        let p = BehaviorsPayload {
            behaviors: vec![
                BehaviorPayload {
                    id: "beh-1".to_string(),
                    capability_ref: "cap-1".to_string(),
                    leverage_ref: None,
                    description: "open the sketchbook".to_string(),
                },
                BehaviorPayload {
                    id: "beh-2".to_string(),
                    capability_ref: "cap-1".to_string(),
                    leverage_ref: Some("lev-1".to_string()),
                    description: "sketch one shape".to_string(),
                },
                BehaviorPayload {
                    id: "beh-3".to_string(),
                    capability_ref: "cap-2".to_string(),
                    leverage_ref: None,
                    description: "mix two colors".to_string(),
                },
            ],
        };
        assert!(matches!(
            validate_behaviors(&p, &ids_with_caps()),
            Err(ValidationError::UncoveredCapability(id)) if id == "cap-3"
        ));
    }

    #[test]
    fn reinforcement_entry_banned_text_rejected() {
        let ids = ids_with_caps();
        let entries = vec![ReinforcementEntry {
            capability_ref: "cap-1".to_string(),
            form: crate::pipeline::schema::BehaviorForm::Initiation,
            behavior_ref: None,
            text: "start a 30 day streak today".to_string(),
            estimated_seconds: 60,
            completion_signal: "done".to_string(),
            success_probability: 0.8,
        }];
        assert!(matches!(
            validate_reinforcement_entries(&entries, &ids),
            Err(ValidationError::BannedContent { needle: "streak", .. })
        ));
    }

    #[test]
    fn recovery_requires_four_interventions_with_depth() {
        let intervention = |id: &str| InterventionPayload {
            id: id.to_string(),
            trigger: "missed a week".to_string(),
            capability_ref: Some("cap-1".to_string()),
            behavior_ref: None,
            variants: vec!["full restart".into(), "tiny restart".into()],
            recovery_scripts: vec!["reopen the notebook".into(), "set out materials".into()],
        };
        let mut p = RecoveryPayload {
            interventions: vec![
                intervention("int-1"),
                intervention("int-2"),
                intervention("int-3"),
                intervention("int-4"),
            ],
            progressive_strategy: "raise difficulty one stage at a time".to_string(),
            low_effort_variant: "one minute version".to_string(),
            interruption_recovery: "restart at the previous stage".to_string(),
        };
        assert!(validate_recovery(&p, &ids_with_caps()).is_ok());

        p.interventions[1].variants.pop();
        assert!(matches!(
            validate_recovery(&p, &ids_with_caps()),
            Err(ValidationError::TooFew { what: "intervention.variants", .. })
        ));

        p.interventions[1].variants.push("tiny restart".into());
        p.interventions.truncate(3);
        assert!(matches!(
            validate_recovery(&p, &ids_with_caps()),
            Err(ValidationError::TooFew { what: "interventions", .. })
        ));
    }
}
