//! The built-in support pool.
//!
//! A goal-independent map of small wellbeing actions, registered under a
//! reserved goal key. It is constructed in code, never generated, so the
//! support stream exists before any oracle call has ever succeeded.

use chrono::Utc;

use crate::map::{HabitMap, MicroAction, RouteEntry, RouteTag, Stage, Step, STAGE_PREFIXES};

/// Reserved goal key for the support pool. Cannot be registered or removed
/// as a user goal.
pub const SUPPORT_GOAL: &str = "_support";

/// Whether a goal name is the reserved support key.
pub fn is_support_goal(goal: &str) -> bool {
    goal == SUPPORT_GOAL
}

struct SupportStep {
    title: &'static str,
    category: &'static str,
    actions: &'static [(&'static str, &'static str, u32)],
}

/// One step per stage; texts get gentler at low stages and slightly more
/// involved higher up.
const SUPPORT_STEPS: [SupportStep; 5] = [
    SupportStep {
        title: "Reset your body",
        category: "body",
        actions: &[
            ("drink a glass of water", "the glass is empty", 30),
            ("take three slow breaths", "you counted three exhales", 30),
            ("roll your shoulders five times", "five rolls done", 30),
        ],
    },
    SupportStep {
        title: "Reset your space",
        category: "environment",
        actions: &[
            ("clear one item off your desk", "the item is put away", 60),
            ("open a window for fresh air", "the window is open", 30),
            ("refill your water bottle", "the bottle is full", 60),
        ],
    },
    SupportStep {
        title: "Move a little",
        category: "body",
        actions: &[
            ("stretch your arms for thirty seconds", "thirty seconds passed", 30),
            ("walk to another room and back", "you are back", 60),
            ("stand up and balance on one leg", "ten seconds per leg", 45),
        ],
    },
    SupportStep {
        title: "Connect briefly",
        category: "social",
        actions: &[
            ("send a short message to a friend", "the message is sent", 90),
            ("write down one thing you are glad about", "one line written", 60),
            ("say thanks to someone today", "you said it", 60),
        ],
    },
    SupportStep {
        title: "Close the loop",
        category: "reflection",
        actions: &[
            ("note tomorrow's first small task", "one task noted", 90),
            ("tidy your workspace for two minutes", "timer ran out", 120),
            ("put your phone out of reach for a while", "phone is out of reach", 30),
        ],
    },
];

/// Build the support map. Completions are never recorded against it, so
/// the pool stays available regardless of what the user finishes.
pub fn support_map() -> HabitMap {
    let stages = SUPPORT_STEPS
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let step_id = format!("{}1", STAGE_PREFIXES[index]);
            Stage {
                index: index as u8,
                steps: vec![Step {
                    step_id: step_id.clone(),
                    title: spec.title.to_string(),
                    duration_estimate: "2 min".to_string(),
                    fallback: "do the smallest piece of it".to_string(),
                    category: spec.category.to_string(),
                    required_completions: 3,
                    completed_count: 0,
                    actions: spec
                        .actions
                        .iter()
                        .enumerate()
                        .map(|(i, (text, signal, seconds))| MicroAction {
                            id: format!("support-{}-{}", step_id.to_lowercase(), i + 1),
                            parent_step_id: step_id.clone(),
                            capability_ref: None,
                            behavior_ref: None,
                            text: text.to_string(),
                            estimated_seconds: *seconds,
                            completion_signal: signal.to_string(),
                            success_probability: 0.9,
                        })
                        .collect(),
                }],
            }
        })
        .collect();

    HabitMap {
        goal: SUPPORT_GOAL.to_string(),
        mastery_definition: "small resets that keep the rest of the day workable".to_string(),
        frictions: vec![
            "forgetting to pause".to_string(),
            "screens swallowing breaks".to_string(),
            "sitting too long".to_string(),
        ],
        method_route: vec![
            RouteEntry {
                text: "one tiny reset between tasks".to_string(),
                tag: None,
            },
            RouteEntry {
                text: "slightly longer resets as they become habitual".to_string(),
                tag: Some(RouteTag::ProgressiveStrategy),
            },
            RouteEntry {
                text: "one slow breath".to_string(),
                tag: Some(RouteTag::LowEffortVariant),
            },
            RouteEntry {
                text: "start again with the smallest reset".to_string(),
                tag: Some(RouteTag::InterruptionRecovery),
            },
        ],
        stages,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::candidates::candidates;
    use crate::pipeline::validate::validate_map;

    #[test]
    fn support_map_passes_the_full_map_gate() {
        assert!(validate_map(&support_map()).is_ok());
    }

    #[test]
    fn support_map_yields_candidates_with_no_blocklist() {
        let map = support_map();
        let pool = candidates(SUPPORT_GOAL, &map, &[]);
        assert!(!pool.is_empty());
        assert!(pool.iter().all(|c| c.goal == SUPPORT_GOAL));
    }

    #[test]
    fn reserved_key_is_recognized() {
        assert!(is_support_goal(SUPPORT_GOAL));
        assert!(!is_support_goal("run a 10k"));
    }
}
