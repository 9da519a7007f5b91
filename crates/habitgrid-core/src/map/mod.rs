//! The habit map document model.
//!
//! A [`HabitMap`] is the validated, staged representation of how one goal
//! decomposes into progressively harder actions: exactly five stages, each
//! holding at least one [`Step`], each step holding at least one
//! [`MicroAction`]. These types map directly to the persisted JSON format
//! and are deserialized via `serde`.
//!
//! Two on-disk shapes exist for step actions: the current structured object
//! list and a legacy plain string list. Both decode through the same
//! untagged union and normalize into [`MicroAction`], so no business logic
//! ever branches on the shape.

pub mod progress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Number of difficulty stages in every map.
pub const STAGE_COUNT: usize = 5;

/// Step id letter prefixes, indexed by stage.
///
/// A step in stage 2 must have an id starting with `'L'` (e.g. `"L3"`).
pub const STAGE_PREFIXES: [char; STAGE_COUNT] = ['S', 'P', 'L', 'B', 'R'];

/// Clamp bounds for [`Step::required_completions`].
pub const REQUIRED_COMPLETIONS_RANGE: (u8, u8) = (1, 3);

/// Clamp bounds for [`MicroAction::estimated_seconds`].
pub const ACTION_SECONDS_RANGE: (u32, u32) = (15, 600);

/// Clamp bounds for [`MicroAction::success_probability`]. Keeps the value
/// strictly inside (0, 1) so downstream weighting never divides by zero.
pub const SUCCESS_PROBABILITY_RANGE: (f32, f32) = (0.05, 0.95);

/// A goal's validated staged plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HabitMap {
    /// The free-text goal this map decomposes. Unique key for the map.
    pub goal: String,
    /// What mastery of the goal looks like, in the user's terms.
    pub mastery_definition: String,
    /// Known obstacles, ordered by salience. At least 3.
    pub frictions: Vec<String>,
    /// The overall method, ordered. At least 3 entries; must contain one
    /// entry for each [`RouteTag`] variant.
    pub method_route: Vec<RouteEntry>,
    /// Exactly five stages with indices 0 through 4.
    pub stages: Vec<Stage>,
    /// Last successful (re)generation time.
    pub updated_at: DateTime<Utc>,
}

impl HabitMap {
    /// Look up a step by id across all stages.
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.stages
            .iter()
            .flat_map(|s| s.steps.iter())
            .find(|s| s.step_id == step_id)
    }

    /// Mutable variant of [`Self::step`].
    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.stages
            .iter_mut()
            .flat_map(|s| s.steps.iter_mut())
            .find(|s| s.step_id == step_id)
    }

    /// Re-derive per-action parent ids from the owning step.
    ///
    /// Required after decoding a legacy document, where plain string
    /// actions carry no parent reference of their own.
    pub fn reparent_actions(&mut self) {
        for stage in &mut self.stages {
            for step in &mut stage.steps {
                let id = step.step_id.clone();
                for action in &mut step.actions {
                    action.parent_step_id = id.clone();
                }
            }
        }
    }
}

/// One entry of a map's method route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteEntry {
    pub text: String,
    /// Present on the three required strategy entries; `None` for the
    /// free-form base route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<RouteTag>,
}

/// The three method-route entries every map must carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteTag {
    /// How difficulty ramps as stages advance.
    ProgressiveStrategy,
    /// The cheapest still-useful version of the method.
    LowEffortVariant,
    /// How to resume after a lapse.
    InterruptionRecovery,
}

impl RouteTag {
    pub const ALL: [RouteTag; 3] = [
        RouteTag::ProgressiveStrategy,
        RouteTag::LowEffortVariant,
        RouteTag::InterruptionRecovery,
    ];
}

/// One difficulty stage: an ordered list of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    /// Stage index, 0 through 4.
    pub index: u8,
    /// At least one step.
    pub steps: Vec<Step>,
}

/// A unit of practice within a stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Unique within the map. First letter must match the stage's entry in
    /// [`STAGE_PREFIXES`].
    pub step_id: String,
    pub title: String,
    /// Human-readable estimate, e.g. `"10 min"`.
    pub duration_estimate: String,
    /// Lower-effort variant of the step. Never empty.
    pub fallback: String,
    pub category: String,
    /// How many linked micro-action completions finish this step. Clamped
    /// to 1..=3 at decode and assembly time.
    pub required_completions: u8,
    /// Completions recorded so far. Monotonic; capped at
    /// `required_completions`.
    #[serde(default)]
    pub completed_count: u8,
    /// At least one. Accepts both the structured and the legacy string
    /// list shape on deserialization.
    #[serde(deserialize_with = "deserialize_actions")]
    pub actions: Vec<MicroAction>,
}

impl Step {
    /// A step is complete once enough linked micro-actions were done.
    pub fn is_complete(&self) -> bool {
        self.completed_count >= self.required_completions
    }
}

/// The smallest schedulable unit of behavior shown on the board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MicroAction {
    pub id: String,
    /// Id of the owning step.
    #[serde(default)]
    pub parent_step_id: String,
    /// Provenance: capability id from the modeling pass, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_ref: Option<String>,
    /// Provenance: behavior id from the compilation pass, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior_ref: Option<String>,
    /// The instruction shown to the user. Non-empty; passes the banned
    /// content scan.
    pub text: String,
    /// Expected effort. Clamped to [`ACTION_SECONDS_RANGE`].
    pub estimated_seconds: u32,
    /// What "done" observably looks like.
    pub completion_signal: String,
    /// Estimated chance the user follows through, clamped to
    /// [`SUCCESS_PROBABILITY_RANGE`].
    pub success_probability: f32,
}

impl MicroAction {
    /// Build a micro-action from a legacy plain-string task entry.
    ///
    /// Legacy documents carried no ids, estimates, or signals; those fields
    /// are synthesized with conservative defaults.
    pub fn from_legacy(text: &str) -> Self {
        Self {
            id: format!("legacy-{}", uuid::Uuid::new_v4().simple()),
            parent_step_id: String::new(),
            capability_ref: None,
            behavior_ref: None,
            text: text.trim().to_string(),
            estimated_seconds: 60,
            completion_signal: "done when finished once".to_string(),
            success_probability: 0.8,
        }
    }
}

/// On-disk shapes for a step's action list.
///
/// The structured shape is attempted first; a plain string list falls back
/// to the legacy shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawActions {
    Structured(Vec<MicroAction>),
    Legacy(Vec<String>),
}

fn deserialize_actions<'de, D>(deserializer: D) -> Result<Vec<MicroAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawActions::deserialize(deserializer)?;
    Ok(match raw {
        RawActions::Structured(actions) => actions,
        RawActions::Legacy(texts) => texts
            .iter()
            .map(|t| MicroAction::from_legacy(t))
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Clamp helpers
// ---------------------------------------------------------------------------

/// Clamp a raw required-completion count into [`REQUIRED_COMPLETIONS_RANGE`].
pub fn clamp_required_completions(raw: i64) -> u8 {
    let (lo, hi) = REQUIRED_COMPLETIONS_RANGE;
    raw.clamp(lo as i64, hi as i64) as u8
}

/// Clamp a raw seconds estimate into [`ACTION_SECONDS_RANGE`].
pub fn clamp_action_seconds(raw: i64) -> u32 {
    let (lo, hi) = ACTION_SECONDS_RANGE;
    raw.clamp(lo as i64, hi as i64) as u32
}

/// Clamp a raw probability into [`SUCCESS_PROBABILITY_RANGE`].
pub fn clamp_success_probability(raw: f64) -> f32 {
    let (lo, hi) = SUCCESS_PROBABILITY_RANGE;
    (raw as f32).clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_action(id: &str) -> MicroAction {
        MicroAction {
            id: id.to_string(),
            parent_step_id: "S1".to_string(),
            capability_ref: Some("cap-1".to_string()),
            behavior_ref: None,
            text: "lay out your running shoes".to_string(),
            estimated_seconds: 30,
            completion_signal: "shoes are by the door".to_string(),
            success_probability: 0.9,
        }
    }

    fn sample_step() -> Step {
        Step {
            step_id: "S1".to_string(),
            title: "Prepare the night before".to_string(),
            duration_estimate: "2 min".to_string(),
            fallback: "put one shoe by the door".to_string(),
            category: "preparation".to_string(),
            required_completions: 2,
            completed_count: 0,
            actions: vec![sample_action("a1")],
        }
    }

    #[test]
    fn step_completion_is_threshold_based() {
        let mut step = sample_step();
        assert!(!step.is_complete());
        step.completed_count = 1;
        assert!(!step.is_complete());
        step.completed_count = 2;
        assert!(step.is_complete());
    }

    #[test]
    fn structured_actions_deserialize() {
        let json = r#"{
            "step_id": "S1",
            "title": "t",
            "duration_estimate": "5 min",
            "fallback": "f",
            "category": "c",
            "required_completions": 1,
            "actions": [{
                "id": "a1",
                "parent_step_id": "S1",
                "text": "walk to the corner",
                "estimated_seconds": 120,
                "completion_signal": "you reached the corner",
                "success_probability": 0.8
            }]
        }"#;
        let step: Step = serde_json::from_str(json).expect("should parse");
        assert_eq!(step.actions.len(), 1);
        assert_eq!(step.actions[0].text, "walk to the corner");
        assert_eq!(step.actions[0].estimated_seconds, 120);
    }

    #[test]
    fn legacy_string_actions_normalize() {
        let json = r#"{
            "step_id": "P2",
            "title": "t",
            "duration_estimate": "5 min",
            "fallback": "f",
            "category": "c",
            "required_completions": 1,
            "actions": ["walk to the corner", "do five squats"]
        }"#;
        let step: Step = serde_json::from_str(json).expect("should parse");
        assert_eq!(step.actions.len(), 2);
        assert!(step.actions[0].id.starts_with("legacy-"));
        assert_eq!(step.actions[1].text, "do five squats");
        // Synthesized defaults land inside the documented clamp ranges.
        let (lo, hi) = ACTION_SECONDS_RANGE;
        assert!((lo..=hi).contains(&step.actions[0].estimated_seconds));
    }

    #[test]
    fn reparent_fixes_legacy_parents() {
        let mut map = HabitMap {
            goal: "run more".to_string(),
            mastery_definition: "m".to_string(),
            frictions: vec!["a".into(), "b".into(), "c".into()],
            method_route: vec![],
            stages: vec![Stage {
                index: 0,
                steps: vec![Step {
                    actions: vec![MicroAction::from_legacy("walk")],
                    ..sample_step()
                }],
            }],
            updated_at: Utc::now(),
        };
        assert!(map.stages[0].steps[0].actions[0].parent_step_id.is_empty());
        map.reparent_actions();
        assert_eq!(map.stages[0].steps[0].actions[0].parent_step_id, "S1");
    }

    #[test]
    fn clamps_enforce_documented_ranges() {
        assert_eq!(clamp_required_completions(0), 1);
        assert_eq!(clamp_required_completions(2), 2);
        assert_eq!(clamp_required_completions(99), 3);

        assert_eq!(clamp_action_seconds(1), 15);
        assert_eq!(clamp_action_seconds(60), 60);
        assert_eq!(clamp_action_seconds(100_000), 600);

        assert_eq!(clamp_success_probability(0.0), 0.05);
        assert_eq!(clamp_success_probability(0.5), 0.5);
        assert_eq!(clamp_success_probability(1.5), 0.95);
    }

    #[test]
    fn route_tag_roundtrips_as_snake_case() {
        let entry = RouteEntry {
            text: "start again with the smallest version".to_string(),
            tag: Some(RouteTag::InterruptionRecovery),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("interruption_recovery"));
        let back: RouteEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn step_lookup_by_id() {
        let map = HabitMap {
            goal: "g".to_string(),
            mastery_definition: "m".to_string(),
            frictions: vec![],
            method_route: vec![],
            stages: vec![Stage {
                index: 0,
                steps: vec![sample_step()],
            }],
            updated_at: Utc::now(),
        };
        assert!(map.step("S1").is_some());
        assert!(map.step("Z9").is_none());
    }
}
