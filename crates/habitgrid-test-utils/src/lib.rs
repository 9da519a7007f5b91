//! Shared test utilities for habitgrid integration tests.
//!
//! Provides a scripted oracle (a queue of canned responses with prompt
//! recording) and canned pass responses that assemble into a complete,
//! valid habit map.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use habitgrid_core::map::{HabitMap, MicroAction, RouteEntry, RouteTag, Stage, Step};
use habitgrid_core::oracle::{Oracle, OracleError, OracleRequest};
use habitgrid_core::pipeline::schema::BehaviorForm;

/// Oracle that replays a fixed queue of responses and records every
/// request it receives.
///
/// When the queue runs dry, further calls return a server error, which the
/// pipeline never retries -- so a miscounted script fails fast.
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<String, OracleError>>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(responses: Vec<Result<String, OracleError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script of plain successful responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// Every request the oracle has received so far.
    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Server("script exhausted".to_string())))
    }
}

// ---------------------------------------------------------------------------
// Canned pass responses
// ---------------------------------------------------------------------------

pub const CANNED_CAPABILITIES: [&str; 3] = ["cap-1", "cap-2", "cap-3"];

pub fn canned_normalize() -> String {
    json!({
        "mastery_definition": "sketch recognizable scenes from life without hesitation",
        "frictions": [
            "evenings feel too tired for anything",
            "no fixed place to draw",
            "perfectionism stalls the first line"
        ],
        "method_route": [
            "short sessions over long ones",
            "subjects from the immediate surroundings",
            "loose warm-ups before any finished piece"
        ]
    })
    .to_string()
}

pub fn canned_capabilities() -> String {
    json!({
        "capabilities": [
            {"id": "cap-1", "name": "line confidence", "summary": "drawing a line without redrawing it"},
            {"id": "cap-2", "name": "basic proportion", "summary": "keeping relative sizes believable"},
            {"id": "cap-3", "name": "quick observation", "summary": "seeing shapes before details"}
        ],
        "leverage_points": [
            {"id": "lev-1", "capability_ref": "cap-1", "text": "the notebook already on the kitchen table"},
            {"id": "lev-2", "capability_ref": "cap-2", "text": "the morning coffee wait"},
            {"id": "lev-3", "capability_ref": "cap-3", "text": "the commute window seat"}
        ]
    })
    .to_string()
}

pub fn canned_stages() -> String {
    json!({
        "stages": [
            {"index": 0, "steps": [
                {"step_id": "S1", "title": "Single lines", "duration_estimate": "3 min",
                 "fallback": "draw one slow line", "category": "warmup",
                 "required_completions": 2, "capability_ref": "cap-1"}
            ]},
            {"index": 1, "steps": [
                {"step_id": "P1", "title": "Simple shapes", "duration_estimate": "5 min",
                 "fallback": "trace one circle", "category": "practice",
                 "required_completions": 2, "capability_ref": "cap-1"},
                {"step_id": "P2", "title": "Shape pairs", "duration_estimate": "5 min",
                 "fallback": "draw two touching boxes", "category": "practice",
                 "required_completions": 1, "capability_ref": "cap-2"}
            ]},
            {"index": 2, "steps": [
                {"step_id": "L1", "title": "Everyday objects", "duration_estimate": "10 min",
                 "fallback": "outline a mug", "category": "practice",
                 "required_completions": 2, "capability_ref": "cap-2"}
            ]},
            {"index": 3, "steps": [
                {"step_id": "B1", "title": "Corners of rooms", "duration_estimate": "15 min",
                 "fallback": "sketch one wall edge", "category": "scene",
                 "required_completions": 2, "capability_ref": "cap-3"}
            ]},
            {"index": 4, "steps": [
                {"step_id": "R1", "title": "Full small scenes", "duration_estimate": "20 min",
                 "fallback": "thumbnail the scene in one inch", "category": "scene",
                 "required_completions": 3, "capability_ref": "cap-3"}
            ]}
        ]
    })
    .to_string()
}

pub fn canned_behaviors() -> String {
    json!({
        "behaviors": [
            {"id": "beh-1", "capability_ref": "cap-1", "leverage_ref": "lev-1",
             "description": "one continuous line drawn at the kitchen table"},
            {"id": "beh-2", "capability_ref": "cap-2", "leverage_ref": "lev-2",
             "description": "blocking in proportions while the coffee brews"},
            {"id": "beh-3", "capability_ref": "cap-3", "leverage_ref": "lev-3",
             "description": "naming the three biggest shapes out the window"}
        ]
    })
    .to_string()
}

/// One reinforcement entry for a (capability, form) pair.
pub fn reinforcement_entry(cap: &str, form: BehaviorForm) -> serde_json::Value {
    json!({
        "capability_ref": cap,
        "form": form.as_str(),
        "behavior_ref": "beh-1",
        "text": format!("{form} drill for {cap}: one small rep"),
        "estimated_seconds": 90,
        "completion_signal": "the page shows the result",
        "success_probability": 0.85
    })
}

/// Reinforcement response covering exactly the given pairs.
pub fn canned_reinforcement_for(pairs: &[(&str, BehaviorForm)]) -> String {
    let entries: Vec<serde_json::Value> = pairs
        .iter()
        .map(|(cap, form)| reinforcement_entry(cap, *form))
        .collect();
    json!({ "entries": entries }).to_string()
}

/// Reinforcement response covering the full cross-product for the canned
/// capabilities.
pub fn canned_reinforcement_full() -> String {
    let pairs: Vec<(&str, BehaviorForm)> = CANNED_CAPABILITIES
        .iter()
        .flat_map(|cap| BehaviorForm::ALL.iter().map(move |form| (*cap, *form)))
        .collect();
    canned_reinforcement_for(&pairs)
}

pub fn canned_recovery() -> String {
    json!({
        "interventions": [
            {"id": "int-1", "trigger": "missed three sessions",
             "capability_ref": "cap-1", "behavior_ref": "beh-1",
             "variants": ["a full warm-up page", "one slow line"],
             "recovery_scripts": ["open the notebook anywhere", "draw the nearest object's outline"]},
            {"id": "int-2", "trigger": "page looks bad and motivation dips",
             "capability_ref": "cap-2", "behavior_ref": null,
             "variants": ["redraw the same subject smaller", "circle the best part of the page"],
             "recovery_scripts": ["turn to a fresh page", "copy one old sketch"]},
            {"id": "int-3", "trigger": "travel breaks the routine",
             "capability_ref": null, "behavior_ref": null,
             "variants": ["pocket sketchbook session", "one hotel-room object"],
             "recovery_scripts": ["sketch from the window seat", "draw the room key"]},
            {"id": "int-4", "trigger": "no energy after work",
             "capability_ref": "cap-3", "behavior_ref": "beh-3",
             "variants": ["ten minute loose session", "name shapes without drawing"],
             "recovery_scripts": ["sit with the notebook closed for a minute", "draw three boxes"]}
        ],
        "progressive_strategy": "add one constraint per stage, never two",
        "low_effort_variant": "a single slow line on any paper",
        "interruption_recovery": "restart one stage below where you stopped"
    })
    .to_string()
}

/// The six responses of a clean full pipeline run.
pub fn full_pipeline_script() -> Vec<String> {
    vec![
        canned_normalize(),
        canned_capabilities(),
        canned_stages(),
        canned_behaviors(),
        canned_reinforcement_full(),
        canned_recovery(),
    ]
}

// ---------------------------------------------------------------------------
// Sample domain objects
// ---------------------------------------------------------------------------

/// A small, hand-built valid map for board and store tests.
pub fn sample_map(goal: &str) -> HabitMap {
    let step = |id: &str, required: u8, texts: &[&str]| Step {
        step_id: id.to_string(),
        title: format!("step {id}"),
        duration_estimate: "5 min".to_string(),
        fallback: "the smallest version of it".to_string(),
        category: "practice".to_string(),
        required_completions: required,
        completed_count: 0,
        actions: texts
            .iter()
            .enumerate()
            .map(|(i, text)| MicroAction {
                id: format!("{}-{}", id.to_lowercase(), i + 1),
                parent_step_id: id.to_string(),
                capability_ref: None,
                behavior_ref: None,
                text: text.to_string(),
                estimated_seconds: 60,
                completion_signal: "the result is visible".to_string(),
                success_probability: 0.85,
            })
            .collect(),
    };

    HabitMap {
        goal: goal.to_string(),
        mastery_definition: "do the thing comfortably".to_string(),
        frictions: vec![
            "low energy in the evening".to_string(),
            "no fixed routine".to_string(),
            "competing hobbies".to_string(),
        ],
        method_route: vec![
            RouteEntry { text: "tiny sessions first".to_string(), tag: None },
            RouteEntry {
                text: "grow the session length stage by stage".to_string(),
                tag: Some(RouteTag::ProgressiveStrategy),
            },
            RouteEntry {
                text: "the one minute version".to_string(),
                tag: Some(RouteTag::LowEffortVariant),
            },
            RouteEntry {
                text: "restart with the smallest session".to_string(),
                tag: Some(RouteTag::InterruptionRecovery),
            },
        ],
        stages: vec![
            Stage { index: 0, steps: vec![step("S1", 1, &["lay out what you need tonight", "put the gear by the door"])] },
            Stage { index: 1, steps: vec![step("P1", 2, &["do a two minute session", "do the first half only"])] },
            Stage { index: 2, steps: vec![step("L1", 2, &["do a five minute session", "add one small variation"])] },
            Stage { index: 3, steps: vec![step("B1", 2, &["do a ten minute session", "invite someone to join once"])] },
            Stage { index: 4, steps: vec![step("R1", 3, &["do a twenty minute session", "review the week in two lines"])] },
        ],
        updated_at: chrono::Utc::now(),
    }
}
