//! Per-pass response payloads.
//!
//! These types map directly to the JSON each pipeline pass asks the oracle
//! to produce. Numeric fields deserialize wide (`i64`/`f64`) and are
//! clamped into the documented ranges during assembly, never rejected for
//! being out of range.

use serde::{Deserialize, Serialize};

/// Goal normalization: mastery definition, frictions, base method route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizePayload {
    pub mastery_definition: String,
    pub frictions: Vec<String>,
    pub method_route: Vec<String>,
}

/// Skill/capability modeling: capabilities and their leverage points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilitiesPayload {
    pub capabilities: Vec<CapabilityPayload>,
    pub leverage_points: Vec<LeveragePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityPayload {
    /// E.g. `"cap-1"`. Referenced by every later pass.
    pub id: String,
    pub name: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeveragePayload {
    /// E.g. `"lev-1"`.
    pub id: String,
    pub capability_ref: String,
    pub text: String,
}

/// Capability-stage construction: the five stages and their steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagesPayload {
    pub stages: Vec<StagePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagePayload {
    pub index: i64,
    pub steps: Vec<StepPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepPayload {
    pub step_id: String,
    pub title: String,
    pub duration_estimate: String,
    /// May arrive empty; backfilled from the recovery pass at assembly.
    #[serde(default)]
    pub fallback: String,
    pub category: String,
    pub required_completions: i64,
    pub capability_ref: String,
}

/// Behavior compilation: concrete behaviors anchored to capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorsPayload {
    pub behaviors: Vec<BehaviorPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorPayload {
    /// E.g. `"beh-1"`.
    pub id: String,
    pub capability_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage_ref: Option<String>,
    pub description: String,
}

/// The five behavior forms every capability must be reinforced through.
///
/// The reinforcement pass must cover the full (capability x form)
/// cross-product before its output is accepted.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorForm {
    /// Getting started at all.
    Initiation,
    /// Repeating an already-started behavior.
    Repetition,
    /// Swapping a competing behavior for this one.
    Substitution,
    /// Shaping the surroundings so the behavior is easier.
    Environment,
    /// Looking back at what happened.
    Reflection,
}

impl BehaviorForm {
    pub const ALL: [BehaviorForm; 5] = [
        BehaviorForm::Initiation,
        BehaviorForm::Repetition,
        BehaviorForm::Substitution,
        BehaviorForm::Environment,
        BehaviorForm::Reflection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorForm::Initiation => "initiation",
            BehaviorForm::Repetition => "repetition",
            BehaviorForm::Substitution => "substitution",
            BehaviorForm::Environment => "environment",
            BehaviorForm::Reflection => "reflection",
        }
    }
}

impl std::fmt::Display for BehaviorForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reinforcement/micro-action compilation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReinforcementPayload {
    pub entries: Vec<ReinforcementEntry>,
}

/// One micro-action for one (capability, form) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReinforcementEntry {
    pub capability_ref: String,
    pub form: BehaviorForm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior_ref: Option<String>,
    pub text: String,
    pub estimated_seconds: i64,
    pub completion_signal: String,
    pub success_probability: f64,
}

/// Recovery-system synthesis: interventions plus the three tagged
/// method-route strategies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryPayload {
    pub interventions: Vec<InterventionPayload>,
    pub progressive_strategy: String,
    pub low_effort_variant: String,
    pub interruption_recovery: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterventionPayload {
    /// E.g. `"int-1"`.
    pub id: String,
    /// The lapse or obstacle this intervention answers.
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior_ref: Option<String>,
    /// At least 2, ordered from fullest to lightest.
    pub variants: Vec<String>,
    /// At least 2 concrete restart scripts.
    pub recovery_scripts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behavior_form_serializes_snake_case() {
        let json = serde_json::to_string(&BehaviorForm::Environment).unwrap();
        assert_eq!(json, "\"environment\"");
        let back: BehaviorForm = serde_json::from_str("\"reflection\"").unwrap();
        assert_eq!(back, BehaviorForm::Reflection);
    }

    #[test]
    fn all_forms_are_distinct() {
        let mut seen = std::collections::BTreeSet::new();
        for form in BehaviorForm::ALL {
            assert!(seen.insert(form));
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn reinforcement_entry_parses_wide_numbers() {
        let json = r#"{
            "capability_ref": "cap-1",
            "form": "initiation",
            "text": "open the sketchbook to a blank page",
            "estimated_seconds": 100000,
            "completion_signal": "sketchbook is open",
            "success_probability": 1.4
        }"#;
        let entry: ReinforcementEntry = serde_json::from_str(json).expect("should parse");
        // Out-of-range values survive parsing; clamping happens at assembly.
        assert_eq!(entry.estimated_seconds, 100_000);
        assert!(entry.success_probability > 1.0);
    }

    #[test]
    fn step_payload_tolerates_missing_fallback() {
        let json = r#"{
            "step_id": "S1",
            "title": "t",
            "duration_estimate": "5 min",
            "category": "c",
            "required_completions": 2,
            "capability_ref": "cap-1"
        }"#;
        let step: StepPayload = serde_json::from_str(json).expect("should parse");
        assert!(step.fallback.is_empty());
    }
}
