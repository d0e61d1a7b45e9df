use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::appointment::Appointment;
use crate::domain::coverage::InsuranceEligibility;
use crate::domain::patient::Patient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Refused,
    Error,
}

/// One executed tool call as it happened: resolved arguments in, raw result
/// out. The trace is append-only and is the sole source for placeholder
/// resolution during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub tool: String,
    pub arguments: Value,
    pub result: Value,
}

/// Terminal outcome of one agent run.
///
/// `refusal_reason` is always present on the wire (`null` on success) so
/// callers can branch on it without probing for the key; the resolved
/// entities appear only when the run actually produced them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub status: ResponseStatus,
    pub session_id: String,
    pub dry_run: bool,
    pub request: String,
    pub refusal_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Patient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_eligibility: Option<InsuranceEligibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<Appointment>,
    pub tool_trace: Vec<TraceEntry>,
}
