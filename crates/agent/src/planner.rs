//! Plan acquisition: one prompt, one completion, one [`AgentPlan`].
//!
//! Everything a planner can get wrong — prose instead of JSON, a fenced
//! code block, a truncated object, a shape that fails validation —
//! degrades to a refusal plan here. No parse failure ever crosses into
//! the execution loop as an exception.

use chrono::{DateTime, Utc};
use serde_json::Value;

use carelane_core::domain::plan::AgentPlan;

use crate::tools::tool_catalog_json;

const PLANNER_ROLE: &str = "You are a clinical workflow automation agent. You must NOT provide \
     diagnosis or medical advice. You are ONLY allowed to choose tool calls from the provided \
     tools to coordinate operations. Never invent patient_id, slot_id, provider_id, or dates; \
     only use IDs from tool results. Because you are planning before tool execution, you may use \
     placeholders wrapped in angle brackets for IDs that will be obtained from earlier tool \
     results. Use placeholders that clearly indicate intent, e.g., '<PATIENT_ID_FROM_SEARCH_PATIENT>' \
     and '<SLOT_ID_FROM_FIND_AVAILABLE_SLOTS>'. If multiple slots are returned, choose the \
     earliest slot (by start time). If you cannot proceed safely, output a refusal.";

const PLANNING_RULES: &str = "PLANNING RULES:
- For booking/scheduling requests, your plan MUST include (in order): search_patient -> find_available_slots -> book_appointment.
- If the user also asks to check insurance eligibility, include check_insurance_eligibility after search_patient.
- When the user uses relative date phrases, you MUST convert them to explicit ISO dates for tool arguments.
- If required details are missing (e.g., no patient name), return a refusal instead of a partial plan.";

const OUTPUT_CONTRACT: &str = r#"OUTPUT FORMAT (STRICT): Return ONLY a single JSON object (no prose).
Return either:
1) Plan (list of tool calls, in order):
{"type":"plan","tool_calls":[{"name":"<tool_name>","arguments":{...}}],"reason":"<short>"}
2) Refusal (if medical advice or unsafe/ambiguous):
{"type":"refusal","reason":"<why you must refuse or what info is missing>"}"#;

/// Builds the fixed instruction block the planner sees on every run.
/// `now` anchors relative phrases like "tomorrow" to a concrete date.
pub fn system_prompt(now: DateTime<Utc>) -> String {
    let today = now.date_naive();
    let now_iso = now.to_rfc3339();
    let schema_json = tool_catalog_json().to_string();

    format!(
        "{PLANNER_ROLE}\n\n\
         CURRENT TIME CONTEXT (UTC): today={today}, now={now_iso}. \
         Interpret relative date phrases like 'today', 'tomorrow', and 'next week' using this UTC context.\n\n\
         {PLANNING_RULES}\n\n\
         {OUTPUT_CONTRACT}\n\n\
         AVAILABLE TOOLS (with JSON Schemas):\n{schema_json}\n"
    )
}

pub fn plan_prompt(system_prompt: &str, user_request: &str) -> String {
    format!("{system_prompt}\nCURRENT USER REQUEST:\n{user_request}\n\nCREATE A PLAN NOW.")
}

/// Turns a raw completion into a plan, degrading every failure mode to a
/// refusal with a fixed diagnostic reason.
pub fn plan_from_raw(raw: &str) -> AgentPlan {
    let Some(data) = extract_first_json_object(raw) else {
        return AgentPlan::refusal("Planner returned non-JSON output; cannot proceed safely.");
    };

    let Ok(plan) = serde_json::from_value::<AgentPlan>(data) else {
        return AgentPlan::refusal("Planner output failed schema validation; cannot proceed safely.");
    };

    if plan.validate().is_err() {
        return AgentPlan::refusal("Planner output failed schema validation; cannot proceed safely.");
    }

    plan
}

/// Best-effort extraction of the first JSON object in `text`.
///
/// Tolerates a fenced code block and stray prose around the object. The
/// brace scan is string-aware, so braces inside JSON string values (a
/// refusal reason quoting `{}`, say) do not unbalance it.
pub fn extract_first_json_object(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }

    let cleaned = strip_code_fences(text);
    let start = cleaned.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in cleaned[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &cleaned[start..start + offset + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }

    None
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let without_ticks = trimmed.trim_matches('`');
    without_ticks.replacen("json\n", "", 1).trim().to_string()
}
