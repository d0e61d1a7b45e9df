//! The closed tool set the planner may draw from.
//!
//! Dispatch is a match over [`ToolName`], not a lookup keyed by whatever
//! string the planner produced: a name outside the enum is a typed error
//! before any arguments are even looked at. Argument schemas reject
//! unknown keys, so a plan cannot smuggle unvalidated fields into a
//! side-effecting call.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use carelane_core::domain::appointment::Appointment;
use carelane_core::domain::coverage::InsuranceEligibility;
use carelane_core::domain::patient::{Patient, PatientId};
use carelane_core::domain::slot::{Slot, SlotId};
use carelane_db::{RecordStore, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchPatient,
    CheckInsuranceEligibility,
    FindAvailableSlots,
    BookAppointment,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::SearchPatient,
        ToolName::CheckInsuranceEligibility,
        ToolName::FindAvailableSlots,
        ToolName::BookAppointment,
    ];

    pub fn parse(name: &str) -> Option<ToolName> {
        match name {
            "search_patient" => Some(ToolName::SearchPatient),
            "check_insurance_eligibility" => Some(ToolName::CheckInsuranceEligibility),
            "find_available_slots" => Some(ToolName::FindAvailableSlots),
            "book_appointment" => Some(ToolName::BookAppointment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchPatient => "search_patient",
            ToolName::CheckInsuranceEligibility => "check_insurance_eligibility",
            ToolName::FindAvailableSlots => "find_available_slots",
            ToolName::BookAppointment => "book_appointment",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::SearchPatient => {
                "Lookup patients by name substring; returns candidate Patient resources."
            }
            ToolName::CheckInsuranceEligibility => {
                "Check a patient's insurance eligibility as-of a date; returns CoverageEligibilityResponse."
            }
            ToolName::FindAvailableSlots => {
                "Find available appointment slots for a specialty within a date range."
            }
            ToolName::BookAppointment => {
                "Book an appointment for a patient and slot. Supports dry_run."
            }
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    /// The planner asked for a name outside the registry.
    #[error("Unknown tool requested: {0}")]
    UnknownTool(String),
    /// Arguments failed schema validation for the named tool.
    #[error("invalid arguments for {tool}: {details}")]
    InvalidArguments { tool: ToolName, details: String },
    /// A placeholder could not be grounded in this run's trace.
    #[error("{0}")]
    UnresolvedPlaceholder(String),
    /// The store rejected the request itself (unknown ids, taken slot).
    #[error("{0}")]
    Rejected(String),
    /// The store failed. The run aborts instead of refusing.
    #[error("record store failure: {0}")]
    Infrastructure(#[source] StoreError),
}

impl From<StoreError> for ToolError {
    fn from(error: StoreError) -> Self {
        if error.is_infrastructure() {
            ToolError::Infrastructure(error)
        } else {
            ToolError::Rejected(error.to_string())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchPatientArgs {
    pub name_query: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CheckInsuranceEligibilityArgs {
    pub patient_id: String,
    pub as_of: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FindAvailableSlotsArgs {
    pub specialty: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BookAppointmentArgs {
    pub patient_id: String,
    pub slot_id: String,
    pub reason: String,
    #[serde(default)]
    pub dry_run: bool,
}

/// A tool call that has passed schema validation and is ready to run.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolInvocation {
    SearchPatient(SearchPatientArgs),
    CheckInsuranceEligibility(CheckInsuranceEligibilityArgs),
    FindAvailableSlots(FindAvailableSlotsArgs),
    BookAppointment(BookAppointmentArgs),
}

impl ToolInvocation {
    /// Parses raw planner arguments against the schema for `tool`.
    /// Unknown keys, missing fields, wrong types, and constraint
    /// violations all come back as [`ToolError::InvalidArguments`].
    pub fn parse(tool: ToolName, arguments: &Map<String, Value>) -> Result<Self, ToolError> {
        let value = Value::Object(arguments.clone());

        let invocation = match tool {
            ToolName::SearchPatient => {
                serde_json::from_value(value).map(ToolInvocation::SearchPatient)
            }
            ToolName::CheckInsuranceEligibility => {
                serde_json::from_value(value).map(ToolInvocation::CheckInsuranceEligibility)
            }
            ToolName::FindAvailableSlots => {
                serde_json::from_value(value).map(ToolInvocation::FindAvailableSlots)
            }
            ToolName::BookAppointment => {
                serde_json::from_value(value).map(ToolInvocation::BookAppointment)
            }
        }
        .map_err(|error| ToolError::InvalidArguments { tool, details: error.to_string() })?;

        if let Err(details) = invocation.check_constraints() {
            return Err(ToolError::InvalidArguments { tool, details });
        }

        Ok(invocation)
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolInvocation::SearchPatient(_) => ToolName::SearchPatient,
            ToolInvocation::CheckInsuranceEligibility(_) => ToolName::CheckInsuranceEligibility,
            ToolInvocation::FindAvailableSlots(_) => ToolName::FindAvailableSlots,
            ToolInvocation::BookAppointment(_) => ToolName::BookAppointment,
        }
    }

    fn check_constraints(&self) -> Result<(), String> {
        match self {
            ToolInvocation::SearchPatient(args) => {
                min_chars("name_query", &args.name_query, 2)?;
            }
            ToolInvocation::CheckInsuranceEligibility(args) => {
                min_chars("patient_id", &args.patient_id, 1)?;
            }
            ToolInvocation::FindAvailableSlots(args) => {
                min_chars("specialty", &args.specialty, 2)?;
                if args.end_date < args.start_date {
                    return Err("end_date must be >= start_date".to_string());
                }
            }
            ToolInvocation::BookAppointment(args) => {
                min_chars("patient_id", &args.patient_id, 1)?;
                min_chars("slot_id", &args.slot_id, 1)?;
                min_chars("reason", &args.reason, 2)?;
            }
        }
        Ok(())
    }
}

fn min_chars(field: &str, value: &str, minimum: usize) -> Result<(), String> {
    if value.chars().count() < minimum {
        return Err(format!("{field} must be at least {minimum} characters"));
    }
    Ok(())
}

/// Raw result of one tool execution, shaped exactly as it appears in the
/// run trace and in the audit log.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Patients(Vec<Patient>),
    Eligibility(InsuranceEligibility),
    Slots(Vec<Slot>),
    Appointment(Appointment),
}

/// Executes a validated invocation against the record store.
///
/// Domain rejections (unknown ids, taken slots) come back as planner
/// faults; infrastructure failures keep their own variant so the caller
/// can abort the run instead of refusing it.
pub async fn dispatch(
    store: &dyn RecordStore,
    invocation: &ToolInvocation,
) -> Result<ToolOutput, ToolError> {
    match invocation {
        ToolInvocation::SearchPatient(args) => {
            let patients = store.search_patients(&args.name_query).await?;
            Ok(ToolOutput::Patients(patients))
        }
        ToolInvocation::CheckInsuranceEligibility(args) => {
            let eligibility =
                store.coverage_for(&PatientId(args.patient_id.clone()), args.as_of).await?;
            Ok(ToolOutput::Eligibility(eligibility))
        }
        ToolInvocation::FindAvailableSlots(args) => {
            let slots =
                store.available_slots(&args.specialty, args.start_date, args.end_date).await?;
            Ok(ToolOutput::Slots(slots))
        }
        ToolInvocation::BookAppointment(args) => {
            let patient = store
                .patient_by_id(&PatientId(args.patient_id.clone()))
                .await?
                .ok_or_else(|| StoreError::UnknownPatient(args.patient_id.clone()))?;
            let appointment = store
                .book_slot(&patient, &SlotId(args.slot_id.clone()), &args.reason, args.dry_run)
                .await?;
            Ok(ToolOutput::Appointment(appointment))
        }
    }
}

/// The tool catalog serialized for the planner prompt: name, description,
/// and a closed-world JSON Schema per tool.
pub fn tool_catalog_json() -> Value {
    json!([
        {
            "name": ToolName::SearchPatient.as_str(),
            "description": ToolName::SearchPatient.description(),
            "input_schema": {
                "type": "object",
                "additionalProperties": false,
                "required": ["name_query"],
                "properties": {
                    "name_query": { "type": "string", "minLength": 2 }
                }
            }
        },
        {
            "name": ToolName::CheckInsuranceEligibility.as_str(),
            "description": ToolName::CheckInsuranceEligibility.description(),
            "input_schema": {
                "type": "object",
                "additionalProperties": false,
                "required": ["patient_id", "as_of"],
                "properties": {
                    "patient_id": { "type": "string", "minLength": 1 },
                    "as_of": { "type": "string", "format": "date" }
                }
            }
        },
        {
            "name": ToolName::FindAvailableSlots.as_str(),
            "description": ToolName::FindAvailableSlots.description(),
            "input_schema": {
                "type": "object",
                "additionalProperties": false,
                "required": ["specialty", "start_date", "end_date"],
                "properties": {
                    "specialty": { "type": "string", "minLength": 2 },
                    "start_date": { "type": "string", "format": "date" },
                    "end_date": { "type": "string", "format": "date" }
                }
            }
        },
        {
            "name": ToolName::BookAppointment.as_str(),
            "description": ToolName::BookAppointment.description(),
            "input_schema": {
                "type": "object",
                "additionalProperties": false,
                "required": ["patient_id", "slot_id", "reason"],
                "properties": {
                    "patient_id": { "type": "string", "minLength": 1 },
                    "slot_id": { "type": "string", "minLength": 1 },
                    "reason": { "type": "string", "minLength": 2 },
                    "dry_run": { "type": "boolean", "default": false }
                }
            }
        }
    ])
}
