//! Agent runtime - guarded planning and deterministic tool execution
//!
//! This crate is the orchestration layer of carelane - the runtime that:
//! - Screens requests lexically before any model is consulted
//! - Acquires a single-shot plan from the planning model
//! - Executes validated tool calls against the record store, in order
//! - Classifies partial runs into actionable refusals
//!
//! # Architecture
//!
//! A run is a fixed pipeline:
//! 1. **Safety Gate** (`safety`) - Lexical screen; medical-advice requests are refused outright
//! 2. **Plan Acquisition** (`planner`) - One LLM call, parse-or-degrade to a refusal plan
//! 3. **Execution Loop** (`runtime`) - Resolve placeholders, validate, dispatch; stop at the first booking
//! 4. **Outcome Classification** (`runtime`) - Explain runs that finished without a result
//!
//! # Key Types
//!
//! - `AgentRuntime` - Main orchestrator (see `runtime` module)
//! - `PlannerClient` - Pluggable planning-model transport (Gemini, or scripted in tests)
//! - `ToolName` / `ToolInvocation` - The closed tool set and its validated arguments
//!
//! # Safety Principle
//!
//! The LLM is strictly a planner. It NEVER executes anything: every tool
//! call it proposes is schema-validated, grounded via placeholder
//! resolution in this run's own trace, and dispatched against a closed
//! registry. Unknown tools, malformed arguments, and unresolved
//! placeholders end the run as refusals, never as executed actions.

pub mod llm;
pub mod planner;
pub mod resolve;
pub mod runtime;
pub mod safety;
pub mod tools;

pub use llm::{redact_api_keys, GeminiPlanner, PlannerClient};
pub use runtime::AgentRuntime;
pub use safety::{SafetyDecision, SafetyGate};
pub use tools::{ToolError, ToolInvocation, ToolName, ToolOutput};
