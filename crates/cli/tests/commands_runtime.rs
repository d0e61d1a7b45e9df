use std::env;
use std::sync::{Mutex, OnceLock};

use carelane_cli::commands::{doctor, migrate, run, seed};
use serde_json::Value;

#[test]
fn migrate_succeeds_against_a_fresh_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_url = format!("sqlite://{}/clinic.db", dir.path().display());

    with_env(
        &[("CARELANE_DATABASE_URL", &db_url), ("CARELANE_LLM_API_KEY", "test-key")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_reports_config_failure_without_api_key() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_the_demo_clinic_and_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_url = format!("sqlite://{}/clinic.db", dir.path().display());

    with_env(
        &[("CARELANE_DATABASE_URL", &db_url), ("CARELANE_LLM_API_KEY", "test-key")],
        || {
            let first = seed::run();
            assert_eq!(first.exit_code, 0, "expected first seed success: {}", first.output);
            let first_payload = parse_payload(&first.output);
            assert_eq!(first_payload["command"], "seed");
            assert_eq!(first_payload["status"], "ok");

            let message = first_payload["message"].as_str().unwrap_or("");
            assert!(message.contains("patients: 3"), "unexpected seed summary: {message}");
            assert!(message.contains("providers: 2"), "unexpected seed summary: {message}");

            let second = seed::run();
            assert_eq!(second.exit_code, 0, "expected second seed success: {}", second.output);
            let second_payload = parse_payload(&second.output);
            assert_eq!(first_payload["message"], second_payload["message"]);
        },
    );
}

#[test]
fn doctor_json_passes_with_a_complete_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_url = format!("sqlite://{}/clinic.db", dir.path().display());
    let audit_path = dir.path().join("audit_logs").join("audit.jsonl").display().to_string();

    with_env(
        &[
            ("CARELANE_DATABASE_URL", &db_url),
            ("CARELANE_LLM_API_KEY", "test-key"),
            ("CARELANE_AUDIT_LOG_PATH", &audit_path),
        ],
        || {
            let output = doctor::run(true);
            let report = parse_payload(&output);

            assert_eq!(report["overall_status"], "pass", "doctor report: {output}");
            let checks = report["checks"].as_array().expect("checks array");
            assert_eq!(checks.len(), 4);
            assert!(checks.iter().all(|check| check["status"] == "pass"));
        },
    );
}

#[test]
fn doctor_json_skips_downstream_checks_when_config_fails() {
    with_env(&[], || {
        let output = doctor::run(true);
        let report = parse_payload(&output);

        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

#[test]
fn run_reports_a_redacted_config_error_without_api_key() {
    with_env(&[], || {
        let result = run::run("book a cardiology appointment for Ravi Kumar", false);
        assert_eq!(result.exit_code, 1, "expected bootstrap failure exit code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        let message = payload["error"].as_str().unwrap_or("");
        assert!(message.contains("llm.api_key"), "unexpected error message: {message}");
    });
}

#[test]
fn run_refuses_medical_advice_without_contacting_the_planner() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_url = format!("sqlite://{}/clinic.db", dir.path().display());
    let audit_path = dir.path().join("audit.jsonl");
    let audit = audit_path.display().to_string();

    with_env(
        &[
            ("CARELANE_DATABASE_URL", &db_url),
            ("CARELANE_LLM_API_KEY", "test-key"),
            // Unroutable planner endpoint: if the gate let the request
            // through, the command would fail instead of refusing.
            ("CARELANE_LLM_BASE_URL", "http://127.0.0.1:9"),
            ("CARELANE_AUDIT_LOG_PATH", &audit),
        ],
        || {
            let result = run::run("what medication should I take for a cold?", false);
            assert_eq!(result.exit_code, 0, "refusals are successful runs: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "refused");
            assert!(payload["tool_trace"].as_array().is_some_and(Vec::is_empty));

            let log = std::fs::read_to_string(&audit_path).expect("audit log written");
            let events: Vec<String> = log
                .lines()
                .map(|line| {
                    let record: Value = serde_json::from_str(line).expect("valid audit line");
                    record["event"].as_str().unwrap_or_default().to_string()
                })
                .collect();
            assert_eq!(events, vec!["request_received", "refusal", "final_response"]);
        },
    );
}

#[test]
fn run_surfaces_planner_transport_failure_as_an_error_payload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_url = format!("sqlite://{}/clinic.db", dir.path().display());
    let audit = dir.path().join("audit.jsonl").display().to_string();

    with_env(
        &[
            ("CARELANE_DATABASE_URL", &db_url),
            ("CARELANE_LLM_API_KEY", "test-key"),
            ("CARELANE_LLM_BASE_URL", "http://127.0.0.1:9"),
            ("CARELANE_LLM_TIMEOUT_SECS", "2"),
            ("CARELANE_AUDIT_LOG_PATH", &audit),
        ],
        || {
            let result = run::run("book a cardiology appointment for Ravi Kumar", false);
            assert_eq!(result.exit_code, 1, "expected transport failure exit code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            let message = payload["error"].as_str().unwrap_or("");
            assert!(
                message.contains("planner request failed"),
                "unexpected error message: {message}"
            );
            assert!(!message.contains("test-key"), "api key must never surface: {message}");
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CARELANE_DATABASE_URL",
        "CARELANE_DATABASE_MAX_CONNECTIONS",
        "CARELANE_DATABASE_TIMEOUT_SECS",
        "CARELANE_LLM_PROVIDER",
        "CARELANE_LLM_API_KEY",
        "CARELANE_LLM_BASE_URL",
        "CARELANE_LLM_MODEL",
        "CARELANE_LLM_TIMEOUT_SECS",
        "CARELANE_LLM_MAX_OUTPUT_TOKENS",
        "CARELANE_AUDIT_LOG_PATH",
        "CARELANE_LOGGING_LEVEL",
        "CARELANE_LOGGING_FORMAT",
        "CARELANE_LOG_LEVEL",
        "CARELANE_LOG_FORMAT",
        "GEMINI_API_KEY",
        "GEMINI_MODEL",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
