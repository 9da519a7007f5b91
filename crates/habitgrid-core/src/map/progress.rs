//! Stage progression: pure functions deriving the current difficulty stage
//! from completion counters.
//!
//! There is no persisted "current stage" field anywhere; the stage is
//! always recomputed from the steps, which removes the possibility of
//! stage/state drift.

use super::{HabitMap, STAGE_COUNT};

/// Result of recording a completion against a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgress {
    pub step_id: String,
    /// True when this completion pushed the step over its threshold.
    pub step_newly_complete: bool,
}

/// The lowest stage index that still contains an incomplete step, or the
/// maximum stage index when every step is complete.
pub fn current_stage(map: &HabitMap) -> usize {
    map.stages
        .iter()
        .filter(|stage| stage.steps.iter().any(|s| !s.is_complete()))
        .map(|stage| stage.index as usize)
        .min()
        .unwrap_or(STAGE_COUNT - 1)
}

/// Record one micro-action completion against the owning step.
///
/// Increments `completed_count`, saturating at `required_completions`;
/// completion is monotonic and never decremented. Returns `None` when no
/// step with the given id exists in the map.
pub fn record_step_completion(map: &mut HabitMap, step_id: &str) -> Option<StepProgress> {
    let step = map.step_mut(step_id)?;
    let was_complete = step.is_complete();
    step.completed_count = step
        .completed_count
        .saturating_add(1)
        .min(step.required_completions);
    Some(StepProgress {
        step_id: step.step_id.clone(),
        step_newly_complete: !was_complete && step.is_complete(),
    })
}
