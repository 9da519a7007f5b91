//! Candidate pool builder: which micro-actions are eligible for the board
//! right now, given a map's derived stage.

use crate::map::progress::current_stage;
use crate::map::{HabitMap, Step};

/// Minimum text length for a schedulable action.
pub const MIN_ACTION_TEXT_LEN: usize = 8;

/// Non-actionable filler that never earns a board cell.
pub const PLACEHOLDER_PHRASES: &[&str] = &[
    "do your best",
    "try harder",
    "stay motivated",
    "be consistent",
    "keep going",
    "work on it",
    "think about it",
    "just start",
];

/// A schedulable micro-action with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub goal: String,
    pub origin_step_id: String,
    pub action_id: String,
}

/// Whether text is too vague to schedule: too short, or a known
/// placeholder phrase.
pub fn is_vague(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < MIN_ACTION_TEXT_LEN {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    PLACEHOLDER_PHRASES.iter().any(|p| lowered == *p)
}

/// Whether text touches a user-blocked topic (case-insensitive substring).
pub fn is_blocked(text: &str, blocked_topics: &[String]) -> bool {
    let lowered = text.to_lowercase();
    blocked_topics
        .iter()
        .any(|topic| !topic.trim().is_empty() && lowered.contains(&topic.trim().to_lowercase()))
}

/// Steps eligible at the map's current stage: every incomplete step of the
/// stage, plus the first incomplete step of the next stage as a single
/// low-resistance preview (absent when no such stage or step exists).
fn eligible_steps(map: &HabitMap) -> Vec<&Step> {
    let stage = current_stage(map);
    let mut steps: Vec<&Step> = map
        .stages
        .iter()
        .filter(|s| s.index as usize == stage)
        .flat_map(|s| s.steps.iter())
        .filter(|s| !s.is_complete())
        .collect();

    if let Some(preview) = map
        .stages
        .iter()
        .filter(|s| s.index as usize == stage + 1)
        .flat_map(|s| s.steps.iter())
        .find(|s| !s.is_complete())
    {
        steps.push(preview);
    }
    steps
}

/// Enumerate eligible micro-actions for one goal's map, filtered against
/// blocked topics and the vagueness heuristic.
pub fn candidates(goal: &str, map: &HabitMap, blocked_topics: &[String]) -> Vec<Candidate> {
    eligible_steps(map)
        .into_iter()
        .flat_map(|step| step.actions.iter())
        .filter(|action| !is_vague(&action.text) && !is_blocked(&action.text, blocked_topics))
        .map(|action| Candidate {
            text: action.text.clone(),
            goal: goal.to_string(),
            origin_step_id: action.parent_step_id.clone(),
            action_id: action.id.clone(),
        })
        .collect()
}
