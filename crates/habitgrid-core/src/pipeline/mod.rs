//! The generation-and-validation pipeline.
//!
//! `build_habit_map` converts one free-text goal into a validated
//! [`HabitMap`] through six passes, each an oracle round-trip followed by
//! schema validation. A failed pass gets exactly one self-correction retry
//! carrying the validator's error back into the prompt; if that also
//! fails, the whole run fails and no partial map is ever produced.

pub mod attempt;
pub mod patch;
pub mod prompt;
pub mod schema;
pub mod validate;

use std::collections::BTreeMap;

use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, warn};

use crate::map::{
    clamp_action_seconds, clamp_required_completions, clamp_success_probability, HabitMap,
    MicroAction, RouteEntry, RouteTag, Stage, Step,
};
use crate::oracle::{Oracle, OracleError, OracleRequest};

use attempt::{Attempt, SELF_CORRECTION_LIMIT};
use patch::{coverage_targets, CoverageKey, CoverageMerge, PATCH_FOLLOWUP_LIMIT};
use schema::{
    BehaviorForm, BehaviorsPayload, CapabilitiesPayload, NormalizePayload, RecoveryPayload,
    ReinforcementEntry, ReinforcementPayload, StagesPayload,
};
use validate::{IdTable, ValidationError};

/// The six pipeline passes, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Normalize,
    Capabilities,
    Stages,
    Behaviors,
    Reinforcement,
    Recovery,
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Pass::Normalize => "normalize",
            Pass::Capabilities => "capabilities",
            Pass::Stages => "stages",
            Pass::Behaviors => "behaviors",
            Pass::Reinforcement => "reinforcement",
            Pass::Recovery => "recovery",
        })
    }
}

/// Why a pipeline run failed. Terminal for the whole run; the previously
/// stored map (if any) must be retained unchanged by the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("oracle request failed: {0}")]
    Oracle(#[from] OracleError),

    /// A pass exhausted its self-correction budget, or patch mode could
    /// not reach exact coverage within its follow-up budget.
    #[error("pass {pass} exhausted its repair attempts: {last_error}")]
    Exhausted { pass: Pass, last_error: String },

    /// The assembled map failed the final gate. Indicates an assembly bug
    /// rather than bad generated content.
    #[error("assembled map failed final validation: {0}")]
    Assembly(#[source] ValidationError),
}

/// Build a validated habit map for one goal. All-or-nothing: any failure
/// leaves no partial output.
pub async fn build_habit_map(oracle: &dyn Oracle, goal: &str) -> Result<HabitMap, PipelineError> {
    info!(goal, "starting habit map pipeline");

    let normalized: NormalizePayload = run_pass(
        oracle,
        Pass::Normalize,
        prompt::normalize(goal),
        validate::validate_normalize,
    )
    .await?;

    let capabilities: CapabilitiesPayload = run_pass(
        oracle,
        Pass::Capabilities,
        prompt::capabilities(goal),
        validate::validate_capabilities,
    )
    .await?;

    let mut ids = IdTable::default();
    for cap in &capabilities.capabilities {
        ids.capabilities.insert(cap.id.clone());
    }
    for lev in &capabilities.leverage_points {
        ids.leverage_points.insert(lev.id.clone());
    }
    let capability_ids: Vec<String> = capabilities
        .capabilities
        .iter()
        .map(|c| c.id.clone())
        .collect();

    let staged: StagesPayload = run_pass(
        oracle,
        Pass::Stages,
        prompt::stages(goal, &capability_ids),
        |p| validate::validate_stages(p, &ids),
    )
    .await?;
    for stage in &staged.stages {
        for step in &stage.steps {
            ids.steps.insert(step.step_id.clone());
        }
    }

    let behaviors: BehaviorsPayload = run_pass(
        oracle,
        Pass::Behaviors,
        prompt::behaviors(
            goal,
            &capability_ids,
            &capabilities
                .leverage_points
                .iter()
                .map(|l| l.id.clone())
                .collect::<Vec<_>>(),
        ),
        |p| validate::validate_behaviors(p, &ids),
    )
    .await?;
    for behavior in &behaviors.behaviors {
        ids.behaviors.insert(behavior.id.clone());
    }
    let behavior_ids: Vec<String> = behaviors.behaviors.iter().map(|b| b.id.clone()).collect();

    let entries = run_reinforcement(oracle, goal, &ids, &capability_ids, &behavior_ids).await?;

    let recovery: RecoveryPayload = run_pass(
        oracle,
        Pass::Recovery,
        prompt::recovery(goal, &capability_ids, &behavior_ids),
        |p| validate::validate_recovery(p, &ids),
    )
    .await?;

    let map = assemble(goal, &normalized, &staged, &entries, &recovery);
    validate::validate_map(&map).map_err(PipelineError::Assembly)?;

    info!(goal, steps = ids.steps.len(), "habit map pipeline completed");
    Ok(map)
}

// ---------------------------------------------------------------------------
// Pass execution
// ---------------------------------------------------------------------------

/// Strip a Markdown code fence if the oracle wrapped its JSON in one.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

/// Run one pass: prompt, parse, validate, with one self-correction retry.
async fn run_pass<T, V>(
    oracle: &dyn Oracle,
    pass: Pass,
    base: OracleRequest,
    validate: V,
) -> Result<T, PipelineError>
where
    T: DeserializeOwned,
    V: Fn(&T) -> Result<(), ValidationError>,
{
    let mut attempt = Attempt::first(SELF_CORRECTION_LIMIT);
    loop {
        let request = match &attempt.previous_error {
            Some(error) => prompt::with_repair(&base, error),
            None => base.clone(),
        };

        let text = match oracle.generate(&request).await {
            Ok(text) => text,
            // An empty response is treated like unparseable output: the
            // self-correction retry asks for the JSON again.
            Err(OracleError::Empty) => {
                attempt = advance(pass, attempt, "the service returned empty text")?;
                continue;
            }
            Err(e) => return Err(PipelineError::Oracle(e)),
        };

        match serde_json::from_str::<T>(strip_fence(&text)) {
            Ok(payload) => match validate(&payload) {
                Ok(()) => {
                    info!(%pass, repaired = attempt.is_repair(), "pass validated");
                    return Ok(payload);
                }
                Err(e) => attempt = advance(pass, attempt, e.to_string())?,
            },
            Err(e) => {
                attempt = advance(pass, attempt, format!("output was not valid JSON: {e}"))?
            }
        }
    }
}

fn advance(pass: Pass, attempt: Attempt, error: impl Into<String>) -> Result<Attempt, PipelineError> {
    let error = error.into();
    warn!(%pass, error = %error, attempt = attempt.n, "pass rejected, attempting self-correction");
    attempt.next(error.clone()).ok_or(PipelineError::Exhausted {
        pass,
        last_error: error,
    })
}

/// Reinforcement pass with patch mode: request the full cross-product, then
/// ask only for missing (capability, form) pairs, up to 3 follow-ups.
async fn run_reinforcement(
    oracle: &dyn Oracle,
    goal: &str,
    ids: &IdTable,
    capability_ids: &[String],
    behavior_ids: &[String],
) -> Result<BTreeMap<CoverageKey, ReinforcementEntry>, PipelineError> {
    let targets = coverage_targets(capability_ids);
    let mut merge = CoverageMerge::new();

    let initial: ReinforcementPayload = run_pass(
        oracle,
        Pass::Reinforcement,
        prompt::reinforcement(goal, capability_ids, behavior_ids),
        |p: &ReinforcementPayload| validate::validate_reinforcement_entries(&p.entries, ids),
    )
    .await?;
    merge.absorb(initial.entries);

    let mut followups = 0;
    loop {
        let missing = merge.missing(&targets);
        if missing.is_empty() {
            break;
        }
        if followups >= PATCH_FOLLOWUP_LIMIT {
            return Err(PipelineError::Exhausted {
                pass: Pass::Reinforcement,
                last_error: format!(
                    "coverage incomplete after {PATCH_FOLLOWUP_LIMIT} follow-ups: {} pairs missing",
                    missing.len()
                ),
            });
        }
        followups += 1;
        info!(
            missing = missing.len(),
            followup = followups,
            "requesting missing reinforcement pairs"
        );
        let payload: ReinforcementPayload = run_pass(
            oracle,
            Pass::Reinforcement,
            prompt::reinforcement_patch(goal, &missing, behavior_ids),
            |p: &ReinforcementPayload| validate::validate_reinforcement_entries(&p.entries, ids),
        )
        .await?;
        merge.absorb(payload.entries);
    }

    Ok(merge.into_entries())
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Assemble the final map from validated pass outputs.
///
/// Numeric fields are clamped here; every step receives the five
/// form-variant actions compiled for its capability, re-parented to the
/// step id. Exact cross-product coverage guarantees at least one action
/// per step.
fn assemble(
    goal: &str,
    normalized: &NormalizePayload,
    staged: &StagesPayload,
    entries: &BTreeMap<CoverageKey, ReinforcementEntry>,
    recovery: &RecoveryPayload,
) -> HabitMap {
    let mut method_route: Vec<RouteEntry> = normalized
        .method_route
        .iter()
        .map(|text| RouteEntry {
            text: text.clone(),
            tag: None,
        })
        .collect();
    method_route.push(RouteEntry {
        text: recovery.progressive_strategy.clone(),
        tag: Some(RouteTag::ProgressiveStrategy),
    });
    method_route.push(RouteEntry {
        text: recovery.low_effort_variant.clone(),
        tag: Some(RouteTag::LowEffortVariant),
    });
    method_route.push(RouteEntry {
        text: recovery.interruption_recovery.clone(),
        tag: Some(RouteTag::InterruptionRecovery),
    });

    let mut ordered = staged.stages.clone();
    ordered.sort_by_key(|s| s.index);

    let stages = ordered
        .iter()
        .map(|stage| Stage {
            index: stage.index as u8,
            steps: stage
                .steps
                .iter()
                .map(|step| {
                    let fallback = if step.fallback.trim().is_empty() {
                        fallback_for(&step.capability_ref, recovery)
                    } else {
                        step.fallback.clone()
                    };
                    let actions = BehaviorForm::ALL
                        .iter()
                        .filter_map(|form| {
                            entries.get(&(step.capability_ref.clone(), *form)).map(
                                |entry| MicroAction {
                                    id: format!("{}-{form}", step.step_id.to_lowercase()),
                                    parent_step_id: step.step_id.clone(),
                                    capability_ref: Some(entry.capability_ref.clone()),
                                    behavior_ref: entry.behavior_ref.clone(),
                                    text: entry.text.clone(),
                                    estimated_seconds: clamp_action_seconds(
                                        entry.estimated_seconds,
                                    ),
                                    completion_signal: entry.completion_signal.clone(),
                                    success_probability: clamp_success_probability(
                                        entry.success_probability,
                                    ),
                                },
                            )
                        })
                        .collect();
                    Step {
                        step_id: step.step_id.clone(),
                        title: step.title.clone(),
                        duration_estimate: step.duration_estimate.clone(),
                        fallback,
                        category: step.category.clone(),
                        required_completions: clamp_required_completions(
                            step.required_completions,
                        ),
                        completed_count: 0,
                        actions,
                    }
                })
                .collect(),
        })
        .collect();

    HabitMap {
        goal: goal.to_string(),
        mastery_definition: normalized.mastery_definition.clone(),
        frictions: normalized.frictions.clone(),
        method_route,
        stages,
        updated_at: Utc::now(),
    }
}

/// Pick a lower-effort fallback from the recovery system for a step whose
/// generated fallback was empty: the shortest variant of an intervention
/// tied to the same capability reads as the lightest.
fn fallback_for(capability_ref: &str, recovery: &RecoveryPayload) -> String {
    recovery
        .interventions
        .iter()
        .filter(|i| i.capability_ref.as_deref() == Some(capability_ref))
        .flat_map(|i| i.variants.iter())
        .min_by_key(|v| v.len())
        .cloned()
        .unwrap_or_else(|| recovery.low_effort_variant.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::{InterventionPayload, StagePayload, StepPayload};

    #[test]
    fn strip_fence_handles_plain_and_fenced_json() {
        assert_eq!(strip_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn strip_fence_leaves_unterminated_fence_alone() {
        let text = "```json\n{\"a\":1}";
        assert_eq!(strip_fence(text), text.trim());
    }

    fn normalize_payload() -> NormalizePayload {
        NormalizePayload {
            mastery_definition: "sketch from life with confidence".to_string(),
            frictions: vec!["tired evenings".into(), "no desk".into(), "perfectionism".into()],
            method_route: vec![
                "short sessions".into(),
                "subjects from daily life".into(),
                "review weekly".into(),
            ],
        }
    }

    fn recovery_payload() -> RecoveryPayload {
        let intervention = |id: &str, cap: Option<&str>| InterventionPayload {
            id: id.to_string(),
            trigger: "missed several days".to_string(),
            capability_ref: cap.map(str::to_string),
            behavior_ref: None,
            variants: vec!["full session".into(), "one line".into()],
            recovery_scripts: vec!["open sketchbook".into(), "draw one circle".into()],
        };
        RecoveryPayload {
            interventions: vec![
                intervention("int-1", Some("cap-1")),
                intervention("int-2", None),
                intervention("int-3", None),
                intervention("int-4", None),
            ],
            progressive_strategy: "add one constraint per stage".to_string(),
            low_effort_variant: "a thirty second doodle".to_string(),
            interruption_recovery: "restart at the previous stage".to_string(),
        }
    }

    fn entries_for(caps: &[&str]) -> BTreeMap<CoverageKey, ReinforcementEntry> {
        let mut map = BTreeMap::new();
        for cap in caps {
            for form in BehaviorForm::ALL {
                map.insert(
                    (cap.to_string(), form),
                    ReinforcementEntry {
                        capability_ref: cap.to_string(),
                        form,
                        behavior_ref: None,
                        text: format!("{form} action for {cap}"),
                        estimated_seconds: 10_000,
                        completion_signal: "visible result".to_string(),
                        success_probability: 1.2,
                    },
                );
            }
        }
        map
    }

    fn staged_payload() -> StagesPayload {
        let step = |id: &str, cap: &str, fallback: &str| StepPayload {
            step_id: id.to_string(),
            title: format!("step {id}"),
            duration_estimate: "5 min".to_string(),
            fallback: fallback.to_string(),
            category: "practice".to_string(),
            required_completions: 9,
            capability_ref: cap.to_string(),
        };
        StagesPayload {
            stages: vec![
                StagePayload { index: 4, steps: vec![step("R1", "cap-1", "shorter")] },
                StagePayload { index: 0, steps: vec![step("S1", "cap-1", "")] },
                StagePayload { index: 1, steps: vec![step("P1", "cap-1", "shorter")] },
                StagePayload { index: 2, steps: vec![step("L1", "cap-1", "shorter")] },
                StagePayload { index: 3, steps: vec![step("B1", "cap-1", "shorter")] },
            ],
        }
    }

    #[test]
    fn assemble_orders_stages_and_clamps() {
        let map = assemble(
            "sketch daily",
            &normalize_payload(),
            &staged_payload(),
            &entries_for(&["cap-1"]),
            &recovery_payload(),
        );
        let indices: Vec<u8> = map.stages.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);

        let step = &map.stages[0].steps[0];
        assert_eq!(step.required_completions, 3); // clamped from 9
        assert_eq!(step.actions.len(), 5);
        assert_eq!(step.actions[0].estimated_seconds, 600); // clamped
        assert!((step.actions[0].success_probability - 0.95).abs() < f32::EPSILON);
        assert_eq!(step.actions[0].parent_step_id, "S1");
        assert!(validate::validate_map(&map).is_ok());
    }

    #[test]
    fn empty_fallback_is_backfilled_from_recovery() {
        let map = assemble(
            "sketch daily",
            &normalize_payload(),
            &staged_payload(),
            &entries_for(&["cap-1"]),
            &recovery_payload(),
        );
        // S1 had an empty fallback; int-1 is tied to cap-1 and its shortest
        // variant is "one line".
        assert_eq!(map.stages[0].steps[0].fallback, "one line");
        assert_eq!(map.stages[1].steps[0].fallback, "shorter");
    }

    #[test]
    fn assemble_appends_all_three_route_tags() {
        let map = assemble(
            "sketch daily",
            &normalize_payload(),
            &staged_payload(),
            &entries_for(&["cap-1"]),
            &recovery_payload(),
        );
        assert_eq!(map.method_route.len(), 6);
        for tag in RouteTag::ALL {
            assert!(map.method_route.iter().any(|e| e.tag == Some(tag)));
        }
    }
}
