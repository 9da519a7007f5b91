//! Decoder for map documents written by the retired two-pass generation
//! strategy.
//!
//! The two-pass variant persisted a flatter document: a summary, plain
//! string lists, and five "phases" whose steps carry their tasks as bare
//! strings. This module only decodes; the deep multi-pass pipeline is the
//! sole live generation path. Decoded documents are normalized into the
//! current model, including synthesized route tags, so downstream code
//! never branches on the document's age.

use serde::Deserialize;

use habitgrid_core::map::{
    clamp_required_completions, HabitMap, MicroAction, RouteEntry, RouteTag, Stage, Step,
    STAGE_COUNT, STAGE_PREFIXES,
};

/// Top-level shape of a two-pass map document.
#[derive(Debug, Deserialize)]
pub struct LegacyMapDoc {
    pub goal: String,
    /// Became `mastery_definition`.
    pub summary: String,
    /// Became `frictions`.
    #[serde(default)]
    pub obstacles: Vec<String>,
    /// Became the untagged part of `method_route`.
    #[serde(default)]
    pub approach: Vec<String>,
    /// Optional lighter variant; becomes the low-effort route entry.
    #[serde(default)]
    pub easier_version: Option<String>,
    /// Optional restart instruction; becomes the recovery route entry.
    #[serde(default)]
    pub restart_plan: Option<String>,
    pub phases: Vec<LegacyPhase>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyPhase {
    pub steps: Vec<LegacyStep>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyStep {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub easier: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub times_needed: Option<i64>,
    #[serde(default)]
    pub times_done: Option<i64>,
    pub tasks: Vec<String>,
}

/// Why a legacy document could not be normalized.
#[derive(Debug, thiserror::Error)]
pub enum LegacyDecodeError {
    #[error("legacy document must have exactly {STAGE_COUNT} phases, found {0}")]
    WrongPhaseCount(usize),

    #[error("legacy phase {0} has no steps")]
    EmptyPhase(usize),

    #[error("legacy step {0:?} has no tasks")]
    EmptyStep(String),
}

/// Normalize a legacy document into the current model.
pub fn decode(doc: LegacyMapDoc) -> Result<HabitMap, LegacyDecodeError> {
    if doc.phases.len() != STAGE_COUNT {
        return Err(LegacyDecodeError::WrongPhaseCount(doc.phases.len()));
    }

    let mut stages = Vec::with_capacity(STAGE_COUNT);
    for (index, phase) in doc.phases.into_iter().enumerate() {
        if phase.steps.is_empty() {
            return Err(LegacyDecodeError::EmptyPhase(index));
        }
        let prefix = STAGE_PREFIXES[index];
        let steps = phase
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| convert_step(step, prefix, i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        stages.push(Stage {
            index: index as u8,
            steps,
        });
    }

    let mut method_route: Vec<RouteEntry> = doc
        .approach
        .into_iter()
        .map(|text| RouteEntry { text, tag: None })
        .collect();
    method_route.push(RouteEntry {
        text: "work up one phase at a time".to_string(),
        tag: Some(RouteTag::ProgressiveStrategy),
    });
    method_route.push(RouteEntry {
        text: doc
            .easier_version
            .unwrap_or_else(|| "the smallest version of the current step".to_string()),
        tag: Some(RouteTag::LowEffortVariant),
    });
    method_route.push(RouteEntry {
        text: doc
            .restart_plan
            .unwrap_or_else(|| "restart at the previous phase".to_string()),
        tag: Some(RouteTag::InterruptionRecovery),
    });

    let mut map = HabitMap {
        goal: doc.goal,
        mastery_definition: doc.summary,
        frictions: doc.obstacles,
        method_route,
        stages,
        updated_at: doc.updated_at.unwrap_or_else(chrono::Utc::now),
    };
    map.reparent_actions();
    Ok(map)
}

fn convert_step(
    step: LegacyStep,
    prefix: char,
    position: usize,
) -> Result<Step, LegacyDecodeError> {
    if step.tasks.is_empty() {
        return Err(LegacyDecodeError::EmptyStep(step.name));
    }

    // Keep a legacy id only when it already carries the right prefix.
    let step_id = match step.id {
        Some(id) if id.starts_with(prefix) => id,
        _ => format!("{prefix}{position}"),
    };

    let required = clamp_required_completions(step.times_needed.unwrap_or(1));
    let completed = step
        .times_done
        .unwrap_or(0)
        .clamp(0, required as i64) as u8;

    Ok(Step {
        step_id,
        title: step.name,
        duration_estimate: step.duration.unwrap_or_else(|| "5 min".to_string()),
        fallback: step
            .easier
            .unwrap_or_else(|| "do a smaller version of it".to_string()),
        category: step.kind.unwrap_or_else(|| "practice".to_string()),
        required_completions: required,
        completed_count: completed,
        actions: step.tasks.iter().map(|t| MicroAction::from_legacy(t)).collect(),
    })
}
