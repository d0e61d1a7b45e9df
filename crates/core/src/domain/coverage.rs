use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::patient::PatientId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EligibilityId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    Active,
    Inactive,
    Unknown,
}

impl CoverageStatus {
    /// Normalizes a raw policy-record value. Anything outside the known
    /// vocabulary maps to `Unknown` rather than failing the check.
    pub fn from_record(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => CoverageStatus::Active,
            "inactive" => CoverageStatus::Inactive,
            _ => CoverageStatus::Unknown,
        }
    }
}

/// Outcome of an insurance eligibility check as-of a given date.
///
/// An eligibility check never fails outright: patients with no policy on
/// file come back with `Unknown` status and placeholder payer fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsuranceEligibility {
    pub id: EligibilityId,
    pub patient_id: PatientId,
    pub as_of: NaiveDate,
    pub payer: String,
    pub member_id: String,
    pub status: CoverageStatus,
}

#[cfg(test)]
mod tests {
    use super::CoverageStatus;

    #[test]
    fn normalizes_known_statuses_ignoring_case_and_whitespace() {
        assert_eq!(CoverageStatus::from_record("  Active "), CoverageStatus::Active);
        assert_eq!(CoverageStatus::from_record("INACTIVE"), CoverageStatus::Inactive);
    }

    #[test]
    fn unrecognized_statuses_fall_back_to_unknown() {
        assert_eq!(CoverageStatus::from_record("lapsed"), CoverageStatus::Unknown);
        assert_eq!(CoverageStatus::from_record(""), CoverageStatus::Unknown);
    }
}
