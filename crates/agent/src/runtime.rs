//! The execution loop and outcome classifier: one request in, one
//! [`AgentResponse`] out, every step mirrored to the audit trail.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use carelane_core::audit::{AuditSink, AuditTrail};
use carelane_core::domain::appointment::Appointment;
use carelane_core::domain::coverage::InsuranceEligibility;
use carelane_core::domain::patient::Patient;
use carelane_core::domain::plan::{AgentPlan, ToolCall};
use carelane_core::domain::response::{AgentResponse, ResponseStatus, TraceEntry};
use carelane_db::RecordStore;

use crate::llm::PlannerClient;
use crate::planner;
use crate::resolve::resolve_placeholders;
use crate::safety::{SafetyDecision, SafetyGate};
use crate::tools::{dispatch, ToolError, ToolInvocation, ToolName, ToolOutput};

/// Mutable state accumulated by one run's execution loop. Owned by the
/// loop alone for the run's duration; a fresh context is built per run,
/// so nothing leaks across sessions.
#[derive(Default)]
struct RunContext {
    trace: Vec<TraceEntry>,
    resolved_patient: Option<Patient>,
    eligibility: Option<InsuranceEligibility>,
    appointment: Option<Appointment>,
}

pub struct AgentRuntime {
    store: Arc<dyn RecordStore>,
    planner: Arc<dyn PlannerClient>,
    audit: Arc<dyn AuditSink>,
    safety: SafetyGate,
    system_prompt: String,
}

impl AgentRuntime {
    pub fn new(
        store: Arc<dyn RecordStore>,
        planner: Arc<dyn PlannerClient>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            planner,
            audit,
            safety: SafetyGate::new(),
            system_prompt: planner::system_prompt(Utc::now()),
        }
    }

    /// Runs one request end to end.
    ///
    /// Every anticipated failure mode comes back as `Ok` with a refused
    /// response; `Err` is reserved for the truly unexpected (planner
    /// transport down, record store broken) and carries no partial state.
    pub async fn run(&self, request: &str, dry_run: bool) -> anyhow::Result<AgentResponse> {
        let session_id = Uuid::new_v4().simple().to_string();
        let trail = AuditTrail::new(self.audit.clone(), session_id.clone());

        tracing::info!(
            event_name = "agent.run.started",
            session_id = %session_id,
            dry_run,
            "starting agent run"
        );
        trail.record("request_received", json!({ "request": request, "dry_run": dry_run }));

        if let SafetyDecision::Refuse { reason_code, user_message } = self.safety.screen(request) {
            trail.record("refusal", json!({ "reason": reason_code }));
            return Ok(self.finish(
                &trail,
                refused(&session_id, dry_run, request, user_message, RunContext::default()),
            ));
        }

        let plan = self.plan_once(request).await?;
        trail.record("llm_plan", to_payload(&plan));

        let tool_calls = match plan {
            AgentPlan::Refusal { reason } => {
                return Ok(self.finish(
                    &trail,
                    refused(&session_id, dry_run, request, reason, RunContext::default()),
                ));
            }
            AgentPlan::Plan { tool_calls, .. } => tool_calls,
        };

        let mut ctx = RunContext::default();

        for tool_call in &tool_calls {
            match self.execute_tool_call(&trail, tool_call, dry_run, &mut ctx).await {
                Ok(()) => {}
                Err(error @ ToolError::Infrastructure(_)) => {
                    tracing::error!(
                        event_name = "agent.run.store_failure",
                        session_id = %session_id,
                        tool = %tool_call.name,
                        error = %error,
                        "aborting run on record store failure"
                    );
                    return Err(anyhow::Error::new(error));
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.run.tool_failed",
                        session_id = %session_id,
                        tool = %tool_call.name,
                        error = %error,
                        "tool call failed; refusing"
                    );
                    trail.record(
                        "tool_error",
                        json!({
                            "error": "tool_execution_failed",
                            "tool": tool_call.name,
                            "message": error.to_string(),
                        }),
                    );
                    let reason = format!(
                        "Planner produced invalid tool arguments (often placeholders instead of \
                         real IDs). Details: {error}"
                    );
                    return Ok(self.finish(
                        &trail,
                        refused(&session_id, dry_run, request, reason, ctx),
                    ));
                }
            }

            // Booking is the unique terminal action of a workflow.
            if ctx.appointment.is_some() {
                break;
            }
        }

        Ok(self.finish(&trail, classify(&session_id, dry_run, request, ctx)))
    }

    async fn plan_once(&self, request: &str) -> anyhow::Result<AgentPlan> {
        let prompt = planner::plan_prompt(&self.system_prompt, request);
        let raw = self.planner.complete(&prompt).await.context("planner request failed")?;
        Ok(planner::plan_from_raw(&raw))
    }

    async fn execute_tool_call(
        &self,
        trail: &AuditTrail,
        tool_call: &ToolCall,
        dry_run: bool,
        ctx: &mut RunContext,
    ) -> Result<(), ToolError> {
        let Some(tool) = ToolName::parse(&tool_call.name) else {
            trail.record("tool_error", json!({ "error": "unknown_tool", "tool": tool_call.name }));
            return Err(ToolError::UnknownTool(tool_call.name.clone()));
        };

        let mut arguments = tool_call.arguments.clone();
        if tool == ToolName::BookAppointment {
            arguments.entry("dry_run").or_insert(Value::Bool(dry_run));
        }

        let arguments =
            match resolve_placeholders(tool, &arguments, ctx.resolved_patient.as_ref(), &ctx.trace)
            {
                Ok(resolved) => resolved,
                Err(error) => {
                    trail.record(
                        "tool_error",
                        json!({
                            "error": "unresolved_placeholder",
                            "tool": tool.as_str(),
                            "message": error.to_string(),
                        }),
                    );
                    return Err(error);
                }
            };

        let invocation = match ToolInvocation::parse(tool, &arguments) {
            Ok(invocation) => invocation,
            Err(error) => {
                if let ToolError::InvalidArguments { details, .. } = &error {
                    trail.record(
                        "tool_error",
                        json!({
                            "error": "invalid_arguments",
                            "tool": tool.as_str(),
                            "details": details,
                        }),
                    );
                }
                return Err(error);
            }
        };

        trail.record("tool_call", json!({ "tool": tool.as_str(), "arguments": arguments }));

        let output = dispatch(self.store.as_ref(), &invocation).await?;
        let result = serde_json::to_value(&output).unwrap_or(Value::Null);
        trail.record("tool_result", json!({ "tool": tool.as_str(), "result": result }));

        match &output {
            ToolOutput::Patients(patients) => {
                if patients.len() == 1 {
                    ctx.resolved_patient = Some(patients[0].clone());
                }
            }
            ToolOutput::Eligibility(eligibility) => ctx.eligibility = Some(eligibility.clone()),
            ToolOutput::Appointment(appointment) => ctx.appointment = Some(appointment.clone()),
            ToolOutput::Slots(_) => {}
        }

        ctx.trace.push(TraceEntry {
            tool: tool.as_str().to_string(),
            arguments: Value::Object(arguments),
            result,
        });

        Ok(())
    }

    /// Records the terminal audit event and hands the response back.
    fn finish(&self, trail: &AuditTrail, response: AgentResponse) -> AgentResponse {
        trail.record("final_response", to_payload(&response));
        tracing::info!(
            event_name = "agent.run.finished",
            session_id = %response.session_id,
            status = ?response.status,
            "agent run finished"
        );
        response
    }
}

/// Explains a loop that finished without a booking or coverage result.
/// With either present the run is a success, even when the other goal
/// was never reached.
fn classify(session_id: &str, dry_run: bool, request: &str, ctx: RunContext) -> AgentResponse {
    if ctx.appointment.is_none() && ctx.eligibility.is_none() {
        let reason = if empty_slot_search(&ctx.trace) {
            "No available slots found for the requested criteria; unable to book an appointment."
                .to_string()
        } else {
            partial_refusal_reason(&ctx.trace)
        };
        return refused(session_id, dry_run, request, reason, ctx);
    }

    AgentResponse {
        status: ResponseStatus::Ok,
        session_id: session_id.to_string(),
        dry_run,
        request: request.to_string(),
        refusal_reason: None,
        patient: ctx.resolved_patient,
        insurance_eligibility: ctx.eligibility,
        appointment: ctx.appointment,
        tool_trace: ctx.trace,
    }
}

/// True when the most recent slot search came back empty.
fn empty_slot_search(trace: &[TraceEntry]) -> bool {
    trace
        .iter()
        .rev()
        .find(|entry| entry.tool == ToolName::FindAvailableSlots.as_str())
        .and_then(|entry| entry.result.as_array())
        .is_some_and(|slots| slots.is_empty())
}

/// Refusal reason derived from the most recent patient search: no match,
/// ambiguous match, or a plan that found the patient and then stopped.
fn partial_refusal_reason(trace: &[TraceEntry]) -> String {
    let last_search = trace
        .iter()
        .rev()
        .find(|entry| entry.tool == ToolName::SearchPatient.as_str())
        .and_then(|entry| entry.result.as_array());

    let Some(matches) = last_search else {
        return "Unable to complete the workflow safely.".to_string();
    };

    match matches.len() {
        0 => "No matching patient found; please provide the full patient name.".to_string(),
        1 => "Patient found, but the planner did not complete scheduling. Please retry with a \
              specific date/time (or date range) for the appointment."
            .to_string(),
        _ => "Multiple patients matched; please provide the full patient name.".to_string(),
    }
}

fn refused(
    session_id: &str,
    dry_run: bool,
    request: &str,
    reason: String,
    ctx: RunContext,
) -> AgentResponse {
    AgentResponse {
        status: ResponseStatus::Refused,
        session_id: session_id.to_string(),
        dry_run,
        request: request.to_string(),
        refusal_reason: Some(reason),
        patient: ctx.resolved_patient,
        insurance_eligibility: ctx.eligibility,
        appointment: ctx.appointment,
        tool_trace: ctx.trace,
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
