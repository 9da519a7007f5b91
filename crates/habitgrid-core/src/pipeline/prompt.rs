//! Prompt construction for each pipeline pass.
//!
//! Each builder embeds the output schema explicitly and references outputs
//! of earlier passes by id only -- never by paraphrased text -- so the
//! oracle cannot drift from the ids the validators will resolve against.

use crate::oracle::OracleRequest;

use super::schema::BehaviorForm;

/// Role and output contract shared by every pass.
pub const SYSTEM_INSTRUCTION: &str = "You are a behavior-design assistant. \
You decompose one personal goal into small, concrete, observable actions. \
Respond with a single JSON object matching the requested schema exactly: \
no prose before or after, no Markdown fences, no comments. \
Keep every text field short, specific, and free of metric or cadence framing.";

const NORMALIZE_SCHEMA: &str = r#"## Output schema

{
  "mastery_definition": "string, what mastery of the goal looks like",
  "frictions": ["string", "at least 3 obstacles, most salient first"],
  "method_route": ["string", "at least 3 ordered method entries"]
}
"#;

const CAPABILITIES_SCHEMA: &str = r#"## Output schema

{
  "capabilities": [
    {"id": "cap-1", "name": "string", "summary": "string"}
  ],
  "leverage_points": [
    {"id": "lev-1", "capability_ref": "cap-1", "text": "string"}
  ]
}

At least 3 capabilities and 3 leverage points. Ids must be unique; every
leverage point's capability_ref must be one of the capability ids above.
"#;

const STAGES_SCHEMA: &str = r#"## Output schema

{
  "stages": [
    {
      "index": 0,
      "steps": [
        {
          "step_id": "S1",
          "title": "string",
          "duration_estimate": "string, e.g. \"5 min\"",
          "fallback": "string, a lower-effort variant",
          "category": "string",
          "required_completions": 2,
          "capability_ref": "cap-1"
        }
      ]
    }
  ]
}

Exactly five stages with indices 0 through 4, each with at least one step.
Step ids must be unique and carry the stage's letter prefix: stage 0 ids
start with S, stage 1 with P, stage 2 with L, stage 3 with B, stage 4
with R. required_completions is between 1 and 3.
"#;

const BEHAVIORS_SCHEMA: &str = r#"## Output schema

{
  "behaviors": [
    {
      "id": "beh-1",
      "capability_ref": "cap-1",
      "leverage_ref": "lev-1",
      "description": "string, one concrete behavior"
    }
  ]
}

At least 3 behaviors. Every capability listed below must be covered by at
least one behavior. leverage_ref is optional; when present it must be one
of the leverage ids below.
"#;

const REINFORCEMENT_SCHEMA: &str = r#"## Output schema

{
  "entries": [
    {
      "capability_ref": "cap-1",
      "form": "initiation",
      "behavior_ref": "beh-1",
      "text": "string, one tiny concrete action",
      "estimated_seconds": 120,
      "completion_signal": "string, what done observably looks like",
      "success_probability": 0.8
    }
  ]
}

behavior_ref is optional. estimated_seconds is between 15 and 600.
success_probability is strictly between 0 and 1.
"#;

const RECOVERY_SCHEMA: &str = r#"## Output schema

{
  "interventions": [
    {
      "id": "int-1",
      "trigger": "string, the lapse this answers",
      "capability_ref": "cap-1",
      "behavior_ref": "beh-1",
      "variants": ["string", "at least 2, fullest first"],
      "recovery_scripts": ["string", "at least 2 concrete restart scripts"]
    }
  ],
  "progressive_strategy": "string, how difficulty ramps across stages",
  "low_effort_variant": "string, the cheapest still-useful version",
  "interruption_recovery": "string, how to resume after a lapse"
}

At least 4 interventions. capability_ref and behavior_ref are optional;
when present they must come from the id lists below.
"#;

fn id_list(label: &str, ids: &[String]) -> String {
    format!("- {label}: {}\n", ids.join(", "))
}

/// Goal normalization pass.
pub fn normalize(goal: &str) -> OracleRequest {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(&format!(
        "Normalize this personal goal into a working definition.\n\nGoal: {goal}\n\n"
    ));
    prompt.push_str(NORMALIZE_SCHEMA);
    OracleRequest::json(SYSTEM_INSTRUCTION, prompt)
}

/// Skill/capability modeling pass.
pub fn capabilities(goal: &str) -> OracleRequest {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(&format!(
        "Model the capabilities someone must build for this goal, and the \
         leverage points (recurring moments or assets) each capability can \
         attach to.\n\nGoal: {goal}\n\n"
    ));
    prompt.push_str(CAPABILITIES_SCHEMA);
    OracleRequest::json(SYSTEM_INSTRUCTION, prompt)
}

/// Capability-stage construction pass.
pub fn stages(goal: &str, capability_ids: &[String]) -> OracleRequest {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(&format!(
        "Construct a five-stage progression of practice steps for this \
         goal. Each step trains exactly one of the capabilities listed \
         below, referenced by id.\n\nGoal: {goal}\n\n## Defined ids\n\n"
    ));
    prompt.push_str(&id_list("capabilities", capability_ids));
    prompt.push('\n');
    prompt.push_str(STAGES_SCHEMA);
    OracleRequest::json(SYSTEM_INSTRUCTION, prompt)
}

/// Behavior compilation pass.
pub fn behaviors(goal: &str, capability_ids: &[String], leverage_ids: &[String]) -> OracleRequest {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(&format!(
        "Compile concrete behaviors that train the capabilities listed \
         below, anchored to the leverage points where useful.\n\n\
         Goal: {goal}\n\n## Defined ids\n\n"
    ));
    prompt.push_str(&id_list("capabilities", capability_ids));
    prompt.push_str(&id_list("leverage points", leverage_ids));
    prompt.push('\n');
    prompt.push_str(BEHAVIORS_SCHEMA);
    OracleRequest::json(SYSTEM_INSTRUCTION, prompt)
}

/// Reinforcement/micro-action compilation pass: full cross-product request.
pub fn reinforcement(
    goal: &str,
    capability_ids: &[String],
    behavior_ids: &[String],
) -> OracleRequest {
    let forms: Vec<&str> = BehaviorForm::ALL.iter().map(|f| f.as_str()).collect();
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(&format!(
        "Compile one micro-action for every (capability, form) pair: each \
         capability listed below crossed with each of the five forms. One \
         entry per pair, {} entries total.\n\nGoal: {goal}\n\n\
         ## Defined ids\n\n",
        capability_ids.len() * BehaviorForm::ALL.len()
    ));
    prompt.push_str(&id_list("capabilities", capability_ids));
    prompt.push_str(&id_list("behaviors", behavior_ids));
    prompt.push_str(&format!("- forms: {}\n\n", forms.join(", ")));
    prompt.push_str(REINFORCEMENT_SCHEMA);
    OracleRequest::json(SYSTEM_INSTRUCTION, prompt)
}

/// Reinforcement patch request: only the missing (capability, form) pairs.
pub fn reinforcement_patch(
    goal: &str,
    missing: &[(String, BehaviorForm)],
    behavior_ids: &[String],
) -> OracleRequest {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(&format!(
        "Your previous response was missing entries. Compile one \
         micro-action for each of these (capability, form) pairs and ONLY \
         these pairs.\n\nGoal: {goal}\n\n## Missing pairs\n\n"
    ));
    for (cap, form) in missing {
        prompt.push_str(&format!("- capability {cap}, form {form}\n"));
    }
    prompt.push('\n');
    prompt.push_str(&id_list("behaviors", behavior_ids));
    prompt.push('\n');
    prompt.push_str(REINFORCEMENT_SCHEMA);
    OracleRequest::json(SYSTEM_INSTRUCTION, prompt)
}

/// Recovery-system synthesis pass.
pub fn recovery(goal: &str, capability_ids: &[String], behavior_ids: &[String]) -> OracleRequest {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(&format!(
        "Synthesize a recovery system for this goal: interventions for the \
         most likely lapses, plus the three route strategies.\n\n\
         Goal: {goal}\n\n## Defined ids\n\n"
    ));
    prompt.push_str(&id_list("capabilities", capability_ids));
    prompt.push_str(&id_list("behaviors", behavior_ids));
    prompt.push('\n');
    prompt.push_str(RECOVERY_SCHEMA);
    OracleRequest::json(SYSTEM_INSTRUCTION, prompt)
}

/// Re-issue a request with the validator's error attached, asking the
/// oracle to repair its own previous output.
pub fn with_repair(base: &OracleRequest, error: &str) -> OracleRequest {
    let mut repaired = base.clone();
    repaired.user_prompt = format!(
        "{}\n\n## Correction required\n\nYour previous response was \
         rejected: {error}\n\nReturn a corrected response that satisfies \
         the schema and the constraint above. Return the complete JSON \
         object, not just the fixed part.",
        base.user_prompt
    );
    repaired
}
