use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

use crate::connection::DbPool;
use crate::store::StoreError;

/// Canonical demo clinic: three patients with coverage, two providers,
/// and a rolling calendar of open slots.
const SEED_PATIENTS: &[SeedPatient] = &[
    SeedPatient {
        id: "pat-001",
        name: "Ravi Kumar",
        dob: "1987-06-12",
        phone: "+91-99999-00001",
    },
    SeedPatient {
        id: "pat-002",
        name: "Ananya Sharma",
        dob: "1992-03-08",
        phone: "+91-99999-00002",
    },
    SeedPatient { id: "pat-003", name: "John Doe", dob: "1979-11-20", phone: "+1-555-0100" },
];

const SEED_POLICIES: &[SeedPolicy] = &[
    SeedPolicy { patient_id: "pat-001", payer: "ACME Health", member_id: "ACME-RA-1001" },
    SeedPolicy { patient_id: "pat-002", payer: "ACME Health", member_id: "ACME-AN-1002" },
    SeedPolicy { patient_id: "pat-003", payer: "BestCare", member_id: "BC-JD-2201" },
];

const SEED_PROVIDERS: &[SeedProvider] = &[
    SeedProvider { id: "prov-100", name: "Dr. Meera Iyer", specialty: "cardiology" },
    SeedProvider { id: "prov-200", name: "Dr. Daniel Kim", specialty: "general" },
];

const HISTORICAL_SLOT_ID: &str = "slot-900";
const HISTORICAL_APPOINTMENT_ID: &str = "appt-seed-001";

/// Deterministic clinic fixtures for demos and tests.
///
/// Slot times are generated relative to a base instant so requests like
/// "tomorrow" and "next week" hit open slots no matter when the dataset
/// is loaded. Loading is idempotent: seed rows are replaced wholesale.
pub struct ClinicSeedDataset;

impl ClinicSeedDataset {
    /// Load the dataset with the calendar anchored at the current time.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, StoreError> {
        Self::load_at(pool, Utc::now()).await
    }

    /// Load the dataset with the calendar anchored at `base`. Tests pass
    /// a fixed base to keep slot times deterministic.
    pub async fn load_at(pool: &DbPool, base: DateTime<Utc>) -> Result<SeedResult, StoreError> {
        let slots = generated_slots(base);
        let historical_start = slots
            .iter()
            .find(|slot| slot.id == HISTORICAL_SLOT_ID)
            .map(|slot| (slot.start, slot.end));

        let mut tx = pool.begin().await?;
        delete_seed_rows(&mut tx).await?;

        for patient in SEED_PATIENTS {
            sqlx::query(
                "INSERT INTO patient (patient_id, name, dob, phone) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(patient.id)
            .bind(patient.name)
            .bind(patient.dob)
            .bind(patient.phone)
            .execute(&mut *tx)
            .await?;
        }

        for policy in SEED_POLICIES {
            sqlx::query(
                "INSERT INTO insurance_policy (patient_id, payer, member_id, status)
                 VALUES (?1, ?2, ?3, 'active')",
            )
            .bind(policy.patient_id)
            .bind(policy.payer)
            .bind(policy.member_id)
            .execute(&mut *tx)
            .await?;
        }

        for provider in SEED_PROVIDERS {
            sqlx::query("INSERT INTO provider (provider_id, name, specialty) VALUES (?1, ?2, ?3)")
                .bind(provider.id)
                .bind(provider.name)
                .bind(provider.specialty)
                .execute(&mut *tx)
                .await?;
        }

        for slot in &slots {
            sqlx::query(
                "INSERT INTO slot (slot_id, provider_id, specialty, start_time, end_time, location, available)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&slot.id)
            .bind(slot.provider_id)
            .bind(slot.specialty)
            .bind(slot.start.to_rfc3339())
            .bind(slot.end.to_rfc3339())
            .bind(slot.location)
            .bind(i64::from(slot.available))
            .execute(&mut *tx)
            .await?;
        }

        if let Some((start, end)) = historical_start {
            sqlx::query(
                "INSERT INTO appointment (
                    appointment_id, patient_id, provider_id, slot_id, specialty,
                    start_time, end_time, reason, status, created_at
                 ) VALUES (?1, 'pat-003', 'prov-200', ?2, 'general', ?3, ?4, 'annual checkup', 'booked', ?5)",
            )
            .bind(HISTORICAL_APPOINTMENT_ID)
            .bind(HISTORICAL_SLOT_ID)
            .bind(start.to_rfc3339())
            .bind(end.to_rfc3339())
            .bind(base.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(SeedResult {
            patients: SEED_PATIENTS.len(),
            policies: SEED_POLICIES.len(),
            providers: SEED_PROVIDERS.len(),
            slots: slots.len(),
            appointments: 1,
        })
    }

    /// Verify that the seed rows exist and match the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, StoreError> {
        let mut checks = Vec::new();

        for patient in SEED_PATIENTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM patient WHERE patient_id = ?1 AND name = ?2)",
            )
            .bind(patient.id)
            .bind(patient.name)
            .fetch_one(pool)
            .await?;
            checks.push((patient.id, present == 1));
        }

        let policy_ids = sql_array_from_ids(
            &SEED_POLICIES.iter().map(|policy| policy.patient_id).collect::<Vec<_>>(),
        );
        let policy_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM insurance_policy WHERE patient_id IN {policy_ids} AND status = 'active'"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("policies", policy_count == SEED_POLICIES.len() as i64));

        for provider in SEED_PROVIDERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM provider WHERE provider_id = ?1 AND specialty = ?2)",
            )
            .bind(provider.id)
            .bind(provider.specialty)
            .fetch_one(pool)
            .await?;
            checks.push((provider.id, present == 1));
        }

        let upcoming_ids = upcoming_slot_ids();
        let quoted_slots =
            sql_array_from_ids(&upcoming_ids.iter().map(String::as_str).collect::<Vec<_>>());
        let upcoming_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM slot WHERE slot_id IN {quoted_slots}"))
                .fetch_one(pool)
                .await?;
        checks.push(("upcoming-slots", upcoming_count == upcoming_ids.len() as i64));

        let historical_slot: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM slot WHERE slot_id = ?1 AND available = 0)",
        )
        .bind(HISTORICAL_SLOT_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("historical-slot", historical_slot == 1));

        let historical_appointment: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM appointment
              WHERE appointment_id = ?1 AND patient_id = 'pat-003' AND status = 'booked')",
        )
        .bind(HISTORICAL_APPOINTMENT_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("historical-appointment", historical_appointment == 1));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove seeded fixtures (and any appointments booked against them).
    pub async fn clean(pool: &DbPool) -> Result<(), StoreError> {
        let mut tx = pool.begin().await?;
        delete_seed_rows(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn delete_seed_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
) -> Result<(), StoreError> {
    let patient_ids =
        sql_array_from_ids(&SEED_PATIENTS.iter().map(|patient| patient.id).collect::<Vec<_>>());
    let provider_ids =
        sql_array_from_ids(&SEED_PROVIDERS.iter().map(|provider| provider.id).collect::<Vec<_>>());
    let slot_ids = seed_slot_ids();
    let quoted_slots = sql_array_from_ids(&slot_ids.iter().map(String::as_str).collect::<Vec<_>>());

    sqlx::query(&format!(
        "DELETE FROM appointment WHERE patient_id IN {patient_ids} OR slot_id IN {quoted_slots}"
    ))
    .execute(&mut **tx)
    .await?;
    sqlx::query(&format!("DELETE FROM insurance_policy WHERE patient_id IN {patient_ids}"))
        .execute(&mut **tx)
        .await?;
    sqlx::query(&format!("DELETE FROM slot WHERE slot_id IN {quoted_slots}"))
        .execute(&mut **tx)
        .await?;
    sqlx::query(&format!("DELETE FROM patient WHERE patient_id IN {patient_ids}"))
        .execute(&mut **tx)
        .await?;
    sqlx::query(&format!("DELETE FROM provider WHERE provider_id IN {provider_ids}"))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

struct SeedPatient {
    id: &'static str,
    name: &'static str,
    dob: &'static str,
    phone: &'static str,
}

struct SeedPolicy {
    patient_id: &'static str,
    payer: &'static str,
    member_id: &'static str,
}

struct SeedProvider {
    id: &'static str,
    name: &'static str,
    specialty: &'static str,
}

struct GeneratedSlot {
    id: String,
    provider_id: &'static str,
    specialty: &'static str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    location: &'static str,
    available: bool,
}

/// Cardiology mornings for the next two weeks, general slots for the
/// next week, plus one historical taken slot backing the seed
/// appointment.
fn generated_slots(base: DateTime<Utc>) -> Vec<GeneratedSlot> {
    let midnight = Utc.from_utc_datetime(&base.date_naive().and_time(NaiveTime::MIN));
    let mut slots = Vec::new();
    let mut next_id = 1;

    for day in 1..=14 {
        for hour in [9, 10, 11] {
            let start = midnight + Duration::days(day) + Duration::hours(hour);
            slots.push(GeneratedSlot {
                id: format!("slot-{next_id:03}"),
                provider_id: "prov-100",
                specialty: "cardiology",
                start,
                end: start + Duration::minutes(30),
                location: "Clinic A",
                available: true,
            });
            next_id += 1;
        }
    }

    for day in 1..=7 {
        for hour in [10, 14] {
            let start = midnight + Duration::days(day) + Duration::hours(hour);
            slots.push(GeneratedSlot {
                id: format!("slot-{next_id:03}"),
                provider_id: "prov-200",
                specialty: "general",
                start,
                end: start + Duration::minutes(20),
                location: "Clinic B",
                available: true,
            });
            next_id += 1;
        }
    }

    let past_start = midnight - Duration::days(1) + Duration::hours(10);
    slots.push(GeneratedSlot {
        id: HISTORICAL_SLOT_ID.to_owned(),
        provider_id: "prov-200",
        specialty: "general",
        start: past_start,
        end: past_start + Duration::minutes(20),
        location: "Clinic B",
        available: false,
    });

    slots
}

fn upcoming_slot_ids() -> Vec<String> {
    (1..=14 * 3 + 7 * 2).map(|id| format!("slot-{id:03}")).collect()
}

fn seed_slot_ids() -> Vec<String> {
    let mut ids = upcoming_slot_ids();
    ids.push(HISTORICAL_SLOT_ID.to_owned());
    ids
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub patients: usize,
    pub policies: usize,
    pub providers: usize,
    pub slots: usize,
    pub appointments: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
