//! Placeholder resolution: planner-supplied `<...>` tokens become real
//! identifiers, using only facts this run has already produced.
//!
//! Resolution runs before schema validation. A placeholder that cannot
//! be grounded is a planner fault with a descriptive error; the engine
//! never guesses a value and never consults the store.

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use carelane_core::domain::patient::Patient;
use carelane_core::domain::response::TraceEntry;

use crate::tools::{ToolError, ToolName};

const PERSON_HINTS: &[&str] = &["patient", "person"];
const SLOT_HINTS: &[&str] = &["slot"];

/// Rewrites placeholder arguments for `tool` and returns the resolved
/// argument map. Identity for tools that take no placeholders and for
/// arguments that are already concrete.
pub fn resolve_placeholders(
    tool: ToolName,
    arguments: &Map<String, Value>,
    resolved_patient: Option<&Patient>,
    trace: &[TraceEntry],
) -> Result<Map<String, Value>, ToolError> {
    let mut resolved = arguments.clone();

    if matches!(tool, ToolName::CheckInsuranceEligibility | ToolName::BookAppointment)
        && resolved.get("patient_id").is_some_and(|value| looks_like_placeholder(value, PERSON_HINTS))
    {
        let patient = resolved_patient.ok_or_else(|| {
            ToolError::UnresolvedPlaceholder(
                "patient_id is a placeholder but no patient was resolved from search_patient."
                    .to_string(),
            )
        })?;
        resolved.insert("patient_id".to_string(), Value::String(patient.id.0.clone()));
    }

    if tool == ToolName::BookAppointment
        && resolved.get("slot_id").is_some_and(|value| looks_like_placeholder(value, SLOT_HINTS))
    {
        let slots = last_slots_from_trace(trace);
        let slot_id = earliest_slot_id(&slots)?;
        resolved.insert("slot_id".to_string(), Value::String(slot_id));
    }

    Ok(resolved)
}

/// A placeholder is a complete angle-bracket-delimited string whose text
/// carries one of the role hints. `" <Patient_Id> "` counts; a value
/// merely containing brackets does not.
fn looks_like_placeholder(value: &Value, hints: &[&str]) -> bool {
    let Some(text) = value.as_str() else {
        return false;
    };

    let trimmed = text.trim();
    if trimmed.len() < 3 || !trimmed.starts_with('<') || !trimmed.ends_with('>') {
        return false;
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    if inner.contains('<') || inner.contains('>') {
        return false;
    }

    let lowered = text.to_lowercase();
    hints.iter().any(|hint| lowered.contains(hint))
}

/// The most recent find-slots result in the trace, filtered to
/// record-shaped entries. Empty when no slot search ran.
fn last_slots_from_trace(trace: &[TraceEntry]) -> Vec<Map<String, Value>> {
    for entry in trace.iter().rev() {
        if entry.tool == ToolName::FindAvailableSlots.as_str() {
            return match entry.result.as_array() {
                Some(items) => {
                    items.iter().filter_map(|item| item.as_object().cloned()).collect()
                }
                None => Vec::new(),
            };
        }
    }
    Vec::new()
}

/// Picks the slot with the minimum start time; ties keep the first slot
/// in result order. Every candidate must carry a parseable `start`.
fn earliest_slot_id(slots: &[Map<String, Value>]) -> Result<String, ToolError> {
    if slots.is_empty() {
        return Err(ToolError::UnresolvedPlaceholder("No available slots to choose from.".to_string()));
    }

    let mut earliest: Option<(DateTime<FixedOffset>, &Map<String, Value>)> = None;
    for slot in slots {
        let start = slot
            .get("start")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .ok_or_else(|| {
                ToolError::UnresolvedPlaceholder(
                    "Slot is missing a parseable 'start' field.".to_string(),
                )
            })?;

        let earlier = earliest.as_ref().map(|(best, _)| start < *best).unwrap_or(true);
        if earlier {
            earliest = Some((start, slot));
        }
    }

    let slot_id = earliest
        .and_then(|(_, best)| best.get("id").and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ToolError::UnresolvedPlaceholder("Slot is missing an 'id' field.".to_string())
        })?;

    Ok(slot_id.to_string())
}
