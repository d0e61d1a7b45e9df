use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DomainError;

/// One planned tool invocation. Unknown keys are rejected so a misshapen
/// planner object cannot smuggle extra directives past validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// The planner's entire contribution to a run: either an ordered batch of
/// tool calls or a refusal. Acquired once up front and never amended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentPlan {
    Plan {
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Refusal {
        reason: String,
    },
}

impl AgentPlan {
    pub fn refusal(reason: impl Into<String>) -> Self {
        AgentPlan::Refusal { reason: reason.into() }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            AgentPlan::Plan { tool_calls, .. } => {
                if tool_calls.is_empty() {
                    return Err(DomainError::InvalidPlan(
                        "plan must include at least one tool call".to_owned(),
                    ));
                }
                if tool_calls.iter().any(|call| call.name.trim().is_empty()) {
                    return Err(DomainError::InvalidPlan(
                        "tool call is missing a name".to_owned(),
                    ));
                }
                Ok(())
            }
            AgentPlan::Refusal { reason } => {
                if reason.trim().is_empty() {
                    return Err(DomainError::InvalidPlan(
                        "refusal must include a reason".to_owned(),
                    ));
                }
                Ok(())
            }
        }
    }
}
