use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use carelane_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use carelane_core::domain::coverage::InsuranceEligibility;
use carelane_core::domain::patient::{Patient, PatientId};
use carelane_core::domain::slot::{Slot, SlotId};

pub mod memory;
pub mod sql;

pub use memory::MemoryRecordStore;
pub use sql::SqlRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("Unknown patient_id: {0}")]
    UnknownPatient(String),
    #[error("Unknown slot_id: {0}")]
    UnknownSlot(String),
    #[error("Slot not available: {0}")]
    SlotUnavailable(String),
}

impl StoreError {
    /// True when the store itself failed rather than the request made
    /// against it. Infrastructure failures abort a run; the domain
    /// rejections degrade into a refusal instead.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Decode(_))
    }
}

/// Clinical record operations available to the agent.
///
/// Implementations are the only path to patient, coverage, slot, and
/// appointment records. The planner never reads or writes records
/// directly; it can only ask for these operations by name.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn patient_by_id(&self, id: &PatientId) -> Result<Option<Patient>, StoreError>;

    /// Case-insensitive substring match over patient names. The query is
    /// trimmed before matching.
    async fn search_patients(&self, name_query: &str) -> Result<Vec<Patient>, StoreError>;

    /// Coverage snapshot for a patient as of a given date. Patients with
    /// no policy on file report `unknown` coverage rather than an error.
    async fn coverage_for(
        &self,
        patient_id: &PatientId,
        as_of: NaiveDate,
    ) -> Result<InsuranceEligibility, StoreError>;

    /// Open slots for a specialty whose start date falls inside the
    /// inclusive date window, ordered by start time.
    async fn available_slots(
        &self,
        specialty: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Slot>, StoreError>;

    /// Books a slot for a patient. With `dry_run` the appointment is
    /// built and returned without persisting anything. Unknown slots and
    /// slots already taken are rejected; at most one booking can ever
    /// win a slot.
    async fn book_slot(
        &self,
        patient: &Patient,
        slot_id: &SlotId,
        reason: &str,
        dry_run: bool,
    ) -> Result<Appointment, StoreError>;
}

/// Mints the appointment record for a booking. Both store backends use
/// this so dry-run and persisted appointments have the same shape.
pub(crate) fn new_booking(patient: &Patient, slot: &Slot, reason: &str) -> Appointment {
    Appointment {
        id: AppointmentId(format!("appt-{}", &Uuid::new_v4().simple().to_string()[..12])),
        status: AppointmentStatus::Booked,
        patient_id: patient.id.clone(),
        patient_name: patient.name.clone(),
        provider_id: slot.provider_id.clone(),
        provider_name: slot.provider_name.clone(),
        slot_id: slot.id.clone(),
        specialty: slot.specialty.clone(),
        start: slot.start,
        end: slot.end,
        reason: reason.to_owned(),
        created_at: Utc::now(),
    }
}
