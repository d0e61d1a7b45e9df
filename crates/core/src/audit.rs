use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of the append-only audit log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub session_id: String,
    pub event: String,
    pub payload: Value,
}

/// Destination for audit records.
///
/// Appending is best-effort by contract: implementations swallow their own
/// failures, so a full disk or unwritable path can never abort a run.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);
}

/// An [`AuditSink`] bound to a single session. Stamps each record with the
/// session id and the current UTC time.
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    session_id: String,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>, session_id: impl Into<String>) -> Self {
        Self { sink, session_id: session_id.into() }
    }

    pub fn record(&self, event: &str, payload: Value) {
        self.sink.append(AuditRecord {
            ts: Utc::now(),
            session_id: self.session_id.clone(),
            event: event.to_owned(),
            payload,
        });
    }
}

/// Appends records as one JSON object per line, creating the parent
/// directory on first use.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: AuditRecord) {
        if let Err(error) = append_line(&self.path, &record) {
            tracing::warn!(
                event_name = "audit.append_failed",
                path = %self.path.display(),
                error = %error,
                "dropping audit record after sink write failure"
            );
        }
    }
}

fn append_line(path: &Path, record: &AuditRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let line = serde_json::to_string(record).map_err(std::io::Error::from)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_names(&self) -> Vec<String> {
        self.records().into_iter().map(|record| record.event).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, record: AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{AuditSink, AuditTrail, InMemoryAuditSink, JsonlAuditSink};

    #[test]
    fn trail_stamps_records_with_session_id() {
        let sink = InMemoryAuditSink::default();
        let trail = AuditTrail::new(Arc::new(sink.clone()), "sess-1");

        trail.record("request_received", json!({"request": "book a visit", "dry_run": false}));
        trail.record("final_response", json!({"status": "refused"}));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.session_id == "sess-1"));
        assert_eq!(sink.event_names(), vec!["request_received", "final_response"]);
        assert_eq!(records[0].payload["request"], "book a visit");
    }

    #[test]
    fn jsonl_sink_appends_one_line_per_record_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("audit.jsonl");
        let sink = JsonlAuditSink::new(&path);
        let trail = AuditTrail::new(Arc::new(sink), "sess-2");

        trail.record("request_received", json!({"request": "hello", "dry_run": true}));
        trail.record("llm_plan", json!({"type": "refusal", "reason": "no patient name"}));

        let contents = std::fs::read_to_string(&path).expect("read audit log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("valid json line");
        assert_eq!(first["session_id"], "sess-2");
        assert_eq!(first["event"], "request_received");
        assert!(first["ts"].is_string());
        assert_eq!(first["payload"]["dry_run"], true);
    }

    #[test]
    fn jsonl_sink_swallows_write_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        // The sink path points at an existing directory, so opening for
        // append fails on every record.
        let sink = JsonlAuditSink::new(dir.path());
        sink.append(super::AuditRecord {
            ts: chrono::Utc::now(),
            session_id: "sess-3".to_owned(),
            event: "request_received".to_owned(),
            payload: json!({}),
        });
    }
}
