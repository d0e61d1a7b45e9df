use thiserror::Error;

/// Violations of the planner output contract.
///
/// Callers treat these as "the planner misbehaved", not as operator errors:
/// the run degrades to a refusal rather than aborting.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}
