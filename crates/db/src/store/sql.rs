use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use carelane_core::domain::appointment::Appointment;
use carelane_core::domain::coverage::{CoverageStatus, EligibilityId, InsuranceEligibility};
use carelane_core::domain::patient::{Patient, PatientId};
use carelane_core::domain::provider::ProviderId;
use carelane_core::domain::slot::{Slot, SlotId};

use super::{new_booking, RecordStore, StoreError};
use crate::DbPool;

/// SQLite-backed record store.
pub struct SqlRecordStore {
    pool: DbPool,
}

impl SqlRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn slot_with_provider(&self, slot_id: &SlotId) -> Result<Option<Slot>, StoreError> {
        let row = sqlx::query(
            "SELECT s.slot_id, s.specialty, s.provider_id, p.name AS provider_name,
                    s.location, s.start_time, s.end_time, s.available
             FROM slot s
             LEFT JOIN provider p ON p.provider_id = s.provider_id
             WHERE s.slot_id = ?1",
        )
        .bind(&slot_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(slot_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl RecordStore for SqlRecordStore {
    async fn patient_by_id(&self, id: &PatientId) -> Result<Option<Patient>, StoreError> {
        let row =
            sqlx::query("SELECT patient_id, name, dob, phone FROM patient WHERE patient_id = ?1")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(patient_from_row).transpose()
    }

    async fn search_patients(&self, name_query: &str) -> Result<Vec<Patient>, StoreError> {
        // instr() keeps plain substring semantics; LIKE would treat `%`
        // and `_` in the query as wildcards.
        let rows = sqlx::query(
            "SELECT patient_id, name, dob, phone
             FROM patient
             WHERE instr(lower(name), ?1) > 0
             ORDER BY patient_id",
        )
        .bind(name_query.trim().to_lowercase())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(patient_from_row).collect()
    }

    async fn coverage_for(
        &self,
        patient_id: &PatientId,
        as_of: NaiveDate,
    ) -> Result<InsuranceEligibility, StoreError> {
        let id = EligibilityId(format!("elig-{}-{}", patient_id.0, as_of));
        let row = sqlx::query(
            "SELECT payer, member_id, status FROM insurance_policy WHERE patient_id = ?1",
        )
        .bind(&patient_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
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
            payer: non_empty_or(row.try_get("payer")?, "unknown"),
            member_id: non_empty_or(row.try_get("member_id")?, "unknown"),
            status: CoverageStatus::from_record(&row.try_get::<String, _>("status")?),
        })
    }

    async fn available_slots(
        &self,
        specialty: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Slot>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.slot_id, s.specialty, s.provider_id, p.name AS provider_name,
                    s.location, s.start_time, s.end_time, s.available
             FROM slot s
             LEFT JOIN provider p ON p.provider_id = s.provider_id
             WHERE lower(trim(s.specialty)) = ?1 AND s.available = 1",
        )
        .bind(specialty.trim().to_lowercase())
        .fetch_all(&self.pool)
        .await?;

        let mut slots = Vec::with_capacity(rows.len());
        for row in rows {
            let slot = slot_from_row(row)?;
            let start_day = slot.start.date_naive();
            if start_day < start_date || start_day > end_date {
                continue;
            }
            slots.push(slot);
        }
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
        if dry_run {
            let slot = self
                .slot_with_provider(slot_id)
                .await?
                .ok_or_else(|| StoreError::UnknownSlot(slot_id.0.clone()))?;
            if !slot.available {
                return Err(StoreError::SlotUnavailable(slot_id.0.clone()));
            }
            return Ok(new_booking(patient, &slot, reason));
        }

        let mut tx = self.pool.begin().await?;

        // Claiming the slot is the first statement of the transaction, so
        // concurrent bookings serialize on the write lock and exactly one
        // of them flips `available`.
        let claimed = sqlx::query("UPDATE slot SET available = 0 WHERE slot_id = ?1 AND available = 1")
            .bind(&slot_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if claimed == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM slot WHERE slot_id = ?1)")
                .bind(&slot_id.0)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists == 1 {
                StoreError::SlotUnavailable(slot_id.0.clone())
            } else {
                StoreError::UnknownSlot(slot_id.0.clone())
            });
        }

        let row = sqlx::query(
            "SELECT s.slot_id, s.specialty, s.provider_id, p.name AS provider_name,
                    s.location, s.start_time, s.end_time, s.available
             FROM slot s
             LEFT JOIN provider p ON p.provider_id = s.provider_id
             WHERE s.slot_id = ?1",
        )
        .bind(&slot_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::Decode(format!("slot `{}` vanished mid-booking", slot_id.0)))?;
        let slot = slot_from_row(row)?;

        let appointment = new_booking(patient, &slot, reason);

        sqlx::query(
            "INSERT INTO appointment (
                appointment_id, patient_id, provider_id, slot_id, specialty,
                start_time, end_time, reason, status, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&appointment.id.0)
        .bind(&appointment.patient_id.0)
        .bind(&appointment.provider_id.0)
        .bind(&appointment.slot_id.0)
        .bind(&appointment.specialty)
        .bind(appointment.start.to_rfc3339())
        .bind(appointment.end.to_rfc3339())
        .bind(&appointment.reason)
        .bind(appointment.status.as_str())
        .bind(appointment.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(appointment)
    }
}

fn patient_from_row(row: SqliteRow) -> Result<Patient, StoreError> {
    Ok(Patient {
        id: PatientId(row.try_get("patient_id")?),
        name: row.try_get("name")?,
        dob: parse_optional_date("dob", row.try_get("dob")?)?,
        phone: row.try_get::<Option<String>, _>("phone")?.filter(|phone| !phone.is_empty()),
    })
}

fn slot_from_row(row: SqliteRow) -> Result<Slot, StoreError> {
    let provider_name: Option<String> = row.try_get("provider_name")?;
    let location: String = row.try_get("location")?;

    Ok(Slot {
        id: SlotId(row.try_get("slot_id")?),
        specialty: row.try_get("specialty")?,
        provider_id: ProviderId(row.try_get("provider_id")?),
        provider_name: provider_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Unknown".to_owned()),
        location: if location.is_empty() { "Main".to_owned() } else { location },
        start: parse_timestamp("start_time", row.try_get("start_time")?)?,
        end: parse_timestamp("end_time", row.try_get("end_time")?)?,
        available: row.try_get::<i64, _>("available")? != 0,
    })
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_owned()
    } else {
        value
    }
}

fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, StoreError> {
    match value {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => parse_date(column, raw).map(Some),
    }
}

fn parse_date(column: &str, value: String) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
        StoreError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            StoreError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use carelane_core::domain::coverage::CoverageStatus;
    use carelane_core::domain::patient::{Patient, PatientId};
    use carelane_core::domain::slot::SlotId;

    use crate::store::{RecordStore, SqlRecordStore, StoreError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_patient(pool: &DbPool, id: &str, name: &str, dob: Option<&str>) {
        sqlx::query("INSERT INTO patient (patient_id, name, dob, phone) VALUES (?1, ?2, ?3, ?4)")
            .bind(id)
            .bind(name)
            .bind(dob)
            .bind(Option::<&str>::None)
            .execute(pool)
            .await
            .expect("insert patient");
    }

    async fn insert_policy(pool: &DbPool, patient_id: &str, payer: &str, status: &str) {
        sqlx::query(
            "INSERT INTO insurance_policy (patient_id, payer, member_id, status)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(patient_id)
        .bind(payer)
        .bind("M-1001")
        .bind(status)
        .execute(pool)
        .await
        .expect("insert policy");
    }

    async fn insert_provider(pool: &DbPool, id: &str, name: &str, specialty: &str) {
        sqlx::query("INSERT INTO provider (provider_id, name, specialty) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(name)
            .bind(specialty)
            .execute(pool)
            .await
            .expect("insert provider");
    }

    async fn insert_slot(
        pool: &DbPool,
        id: &str,
        provider_id: &str,
        specialty: &str,
        start: &str,
        end: &str,
        available: i64,
    ) {
        sqlx::query(
            "INSERT INTO slot (slot_id, provider_id, specialty, start_time, end_time, location, available)
             VALUES (?1, ?2, ?3, ?4, ?5, 'Clinic A', ?6)",
        )
        .bind(id)
        .bind(provider_id)
        .bind(specialty)
        .bind(start)
        .bind(end)
        .bind(available)
        .execute(pool)
        .await
        .expect("insert slot");
    }

    fn test_patient(id: &str, name: &str) -> Patient {
        Patient { id: PatientId(id.to_string()), name: name.to_string(), dob: None, phone: None }
    }

    #[tokio::test]
    async fn search_patients_is_case_insensitive_substring_match() {
        let pool = setup_pool().await;
        insert_patient(&pool, "pt-001", "Ravi Kumar", Some("1987-06-12")).await;
        insert_patient(&pool, "pt-002", "Ananya Sharma", None).await;
        let store = SqlRecordStore::new(pool.clone());

        let hits = store.search_patients("  KUMAR ").await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.0, "pt-001");
        assert_eq!(hits[0].dob, Some(NaiveDate::from_ymd_opt(1987, 6, 12).expect("date")));

        let hits = store.search_patients("an").await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Ananya Sharma");

        // `%` must not act as a wildcard.
        let hits = store.search_patients("%").await.expect("search");
        assert!(hits.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn coverage_for_reports_unknown_without_a_policy_on_file() {
        let pool = setup_pool().await;
        let store = SqlRecordStore::new(pool.clone());

        let as_of = NaiveDate::from_ymd_opt(2026, 1, 15).expect("date");
        let coverage =
            store.coverage_for(&PatientId("pt-404".into()), as_of).await.expect("coverage");

        assert_eq!(coverage.id.0, "elig-pt-404-2026-01-15");
        assert_eq!(coverage.payer, "unknown");
        assert_eq!(coverage.member_id, "unknown");
        assert_eq!(coverage.status, CoverageStatus::Unknown);

        pool.close().await;
    }

    #[tokio::test]
    async fn coverage_for_normalizes_policy_status() {
        let pool = setup_pool().await;
        insert_patient(&pool, "pt-010", "John Doe", None).await;
        insert_policy(&pool, "pt-010", "BestCare", "  ACTIVE ").await;
        let store = SqlRecordStore::new(pool.clone());

        let as_of = NaiveDate::from_ymd_opt(2026, 1, 15).expect("date");
        let coverage =
            store.coverage_for(&PatientId("pt-010".into()), as_of).await.expect("coverage");

        assert_eq!(coverage.payer, "BestCare");
        assert_eq!(coverage.status, CoverageStatus::Active);

        pool.close().await;
    }

    #[tokio::test]
    async fn available_slots_filters_window_and_orders_by_start() {
        let pool = setup_pool().await;
        insert_provider(&pool, "pr-100", "Dr. Meera Iyer", "cardiology").await;
        insert_slot(
            &pool,
            "sl-late",
            "pr-100",
            "cardiology",
            "2026-03-11T10:00:00+00:00",
            "2026-03-11T10:30:00+00:00",
            1,
        )
        .await;
        insert_slot(
            &pool,
            "sl-early",
            "pr-100",
            "cardiology",
            "2026-03-10T09:00:00+00:00",
            "2026-03-10T09:30:00+00:00",
            1,
        )
        .await;
        insert_slot(
            &pool,
            "sl-outside",
            "pr-100",
            "cardiology",
            "2026-03-20T09:00:00+00:00",
            "2026-03-20T09:30:00+00:00",
            1,
        )
        .await;
        insert_slot(
            &pool,
            "sl-taken",
            "pr-100",
            "cardiology",
            "2026-03-10T11:00:00+00:00",
            "2026-03-10T11:30:00+00:00",
            0,
        )
        .await;
        insert_slot(
            &pool,
            "sl-general",
            "pr-100",
            "general",
            "2026-03-10T14:00:00+00:00",
            "2026-03-10T14:20:00+00:00",
            1,
        )
        .await;
        // No provider row: the provider name degrades instead of failing.
        insert_slot(
            &pool,
            "sl-orphan",
            "pr-999",
            "cardiology",
            "2026-03-11T12:00:00+00:00",
            "2026-03-11T12:30:00+00:00",
            1,
        )
        .await;
        let store = SqlRecordStore::new(pool.clone());

        let start = NaiveDate::from_ymd_opt(2026, 3, 10).expect("date");
        let end = NaiveDate::from_ymd_opt(2026, 3, 12).expect("date");
        let slots = store.available_slots(" Cardiology ", start, end).await.expect("slots");

        let ids: Vec<&str> = slots.iter().map(|slot| slot.id.0.as_str()).collect();
        assert_eq!(ids, vec!["sl-early", "sl-late", "sl-orphan"]);
        assert_eq!(slots[0].provider_name, "Dr. Meera Iyer");
        assert_eq!(slots[2].provider_name, "Unknown");
        assert!(slots.iter().all(|slot| slot.available));

        pool.close().await;
    }

    #[tokio::test]
    async fn book_slot_persists_appointment_and_takes_slot() {
        let pool = setup_pool().await;
        insert_patient(&pool, "pt-020", "Ravi Kumar", None).await;
        insert_provider(&pool, "pr-100", "Dr. Meera Iyer", "cardiology").await;
        insert_slot(
            &pool,
            "sl-020",
            "pr-100",
            "cardiology",
            "2026-03-10T09:00:00+00:00",
            "2026-03-10T09:30:00+00:00",
            1,
        )
        .await;
        let store = SqlRecordStore::new(pool.clone());
        let patient = test_patient("pt-020", "Ravi Kumar");

        let appointment = store
            .book_slot(&patient, &SlotId("sl-020".into()), "follow-up", false)
            .await
            .expect("book slot");

        assert!(appointment.id.0.starts_with("appt-"));
        assert_eq!(appointment.patient_name, "Ravi Kumar");
        assert_eq!(appointment.provider_name, "Dr. Meera Iyer");
        assert_eq!(appointment.slot_id.0, "sl-020");
        assert_eq!(appointment.reason, "follow-up");

        let available: i64 = sqlx::query_scalar("SELECT available FROM slot WHERE slot_id = 'sl-020'")
            .fetch_one(&pool)
            .await
            .expect("slot availability");
        assert_eq!(available, 0);

        let persisted: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM appointment WHERE slot_id = 'sl-020'")
                .fetch_one(&pool)
                .await
                .expect("appointment count");
        assert_eq!(persisted, 1);

        // The slot can only be won once.
        let err = store
            .book_slot(&patient, &SlotId("sl-020".into()), "follow-up", false)
            .await
            .expect_err("second booking must fail");
        assert!(matches!(err, StoreError::SlotUnavailable(id) if id == "sl-020"));

        pool.close().await;
    }

    #[tokio::test]
    async fn book_slot_dry_run_leaves_records_untouched() {
        let pool = setup_pool().await;
        insert_patient(&pool, "pt-030", "Ananya Sharma", None).await;
        insert_provider(&pool, "pr-200", "Dr. Daniel Kim", "general").await;
        insert_slot(
            &pool,
            "sl-030",
            "pr-200",
            "general",
            "2026-03-10T14:00:00+00:00",
            "2026-03-10T14:20:00+00:00",
            1,
        )
        .await;
        let store = SqlRecordStore::new(pool.clone());
        let patient = test_patient("pt-030", "Ananya Sharma");

        let appointment = store
            .book_slot(&patient, &SlotId("sl-030".into()), "annual checkup", true)
            .await
            .expect("dry-run booking");
        assert_eq!(appointment.slot_id.0, "sl-030");

        let available: i64 = sqlx::query_scalar("SELECT available FROM slot WHERE slot_id = 'sl-030'")
            .fetch_one(&pool)
            .await
            .expect("slot availability");
        assert_eq!(available, 1);

        let persisted: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM appointment")
            .fetch_one(&pool)
            .await
            .expect("appointment count");
        assert_eq!(persisted, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn book_slot_rejects_unknown_slot() {
        let pool = setup_pool().await;
        insert_patient(&pool, "pt-040", "John Doe", None).await;
        let store = SqlRecordStore::new(pool.clone());
        let patient = test_patient("pt-040", "John Doe");

        let err = store
            .book_slot(&patient, &SlotId("sl-missing".into()), "follow-up", false)
            .await
            .expect_err("unknown slot must fail");
        assert!(matches!(err, StoreError::UnknownSlot(id) if id == "sl-missing"));

        let err = store
            .book_slot(&patient, &SlotId("sl-missing".into()), "follow-up", true)
            .await
            .expect_err("unknown slot must fail in dry-run too");
        assert!(matches!(err, StoreError::UnknownSlot(id) if id == "sl-missing"));

        pool.close().await;
    }
}
