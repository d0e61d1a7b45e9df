pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use audit::{AuditRecord, AuditSink, AuditTrail, InMemoryAuditSink, JsonlAuditSink};
pub use domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
pub use domain::coverage::{CoverageStatus, EligibilityId, InsuranceEligibility};
pub use domain::patient::{Patient, PatientId};
pub use domain::plan::{AgentPlan, ToolCall};
pub use domain::provider::{Provider, ProviderId};
pub use domain::response::{AgentResponse, ResponseStatus, TraceEntry};
pub use domain::slot::{Slot, SlotId};
pub use errors::DomainError;
