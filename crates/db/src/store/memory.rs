use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use carelane_core::domain::appointment::Appointment;
use carelane_core::domain::coverage::{CoverageStatus, EligibilityId, InsuranceEligibility};
use carelane_core::domain::patient::{Patient, PatientId};
use carelane_core::domain::slot::{Slot, SlotId};

use super::{new_booking, RecordStore, StoreError};

/// In-memory record store with the same observable behavior as
/// [`super::SqlRecordStore`]. Used by agent tests and demos where a
/// database file would be overkill.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    patients: Vec<Patient>,
    policies: HashMap<String, PolicyRecord>,
    slots: Vec<Slot>,
    appointments: Vec<Appointment>,
}

#[derive(Clone)]
struct PolicyRecord {
    payer: String,
    member_id: String,
    status: String,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_patient(&self, patient: Patient) {
        self.state.write().await.patients.push(patient);
    }

    pub async fn add_policy(&self, patient_id: &PatientId, payer: &str, member_id: &str, status: &str) {
        self.state.write().await.policies.insert(
            patient_id.0.clone(),
            PolicyRecord {
                payer: payer.to_owned(),
                member_id: member_id.to_owned(),
                status: status.to_owned(),
            },
        );
    }

    pub async fn add_slot(&self, slot: Slot) {
        self.state.write().await.slots.push(slot);
    }

    /// Snapshot of booked appointments, for assertions in tests.
    pub async fn appointments(&self) -> Vec<Appointment> {
        self.state.read().await.appointments.clone()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn patient_by_id(&self, id: &PatientId) -> Result<Option<Patient>, StoreError> {
        let state = self.state.read().await;
        Ok(state.patients.iter().find(|patient| patient.id == *id).cloned())
    }

    async fn search_patients(&self, name_query: &str) -> Result<Vec<Patient>, StoreError> {
        let q = name_query.trim().to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .patients
            .iter()
            .filter(|patient| patient.name.to_lowercase().contains(&q))
            .cloned()
            .collect())
    }

    async fn coverage_for(
        &self,
        patient_id: &PatientId,
        as_of: NaiveDate,
    ) -> Result<InsuranceEligibility, StoreError> {
        let id = EligibilityId(format!("elig-{}-{}", patient_id.0, as_of));
        let state = self.state.read().await;
        let Some(policy) = state.policies.get(&patient_id.0) else {
            return Ok(InsuranceEligibility {
                id,
                patient_id: patient_id.clone(),
                as_of,
                payer: "unknown".to_owned(),
                member_id: "unknown".to_owned(),
                status: CoverageStatus::Unknown,
            });
        };

        Ok(InsuranceEligibility {
            id,
            patient_id: patient_id.clone(),
            as_of,
            payer: fallback_if_empty(&policy.payer),
            member_id: fallback_if_empty(&policy.member_id),
            status: CoverageStatus::from_record(&policy.status),
        })
    }

    async fn available_slots(
        &self,
        specialty: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Slot>, StoreError> {
        let wanted = specialty.trim().to_lowercase();
        let state = self.state.read().await;
        let mut slots: Vec<Slot> = state
            .slots
            .iter()
            .filter(|slot| slot.available && slot.specialty.trim().to_lowercase() == wanted)
            .filter(|slot| {
                let day = slot.start.date_naive();
                day >= start_date && day <= end_date
            })
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.start);
        Ok(slots)
    }

    async fn book_slot(
        &self,
        patient: &Patient,
        slot_id: &SlotId,
        reason: &str,
        dry_run: bool,
    ) -> Result<Appointment, StoreError> {
        let mut state = self.state.write().await;
        let Some(index) = state.slots.iter().position(|slot| slot.id == *slot_id) else {
            return Err(StoreError::UnknownSlot(slot_id.0.clone()));
        };
        if !state.slots[index].available {
            return Err(StoreError::SlotUnavailable(slot_id.0.clone()));
        }

        let appointment = new_booking(patient, &state.slots[index], reason);
        if dry_run {
            return Ok(appointment);
        }

        state.slots[index].available = false;
        state.appointments.push(appointment.clone());
        Ok(appointment)
    }
}

fn fallback_if_empty(value: &str) -> String {
    if value.is_empty() {
        "unknown".to_owned()
    } else {
        value.to_owned()
    }
}
