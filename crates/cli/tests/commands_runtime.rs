use std::env;
use std::sync::{Mutex, OnceLock};

use docflow_cli::commands::{doctor, migrate, seed, sweep};
use docflow_cli::SweepMode;
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&[("DOCFLOW_DATABASE_URL", &database_url(&dir))], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["applied"], 3);

        let again = parse_payload(&migrate::run().output);
        assert_eq!(again["details"]["applied"], 0);
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("DOCFLOW_DATABASE_URL", "postgres://localhost/docflow")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_repeatable_and_reports_document_types() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&[("DOCFLOW_DATABASE_URL", &database_url(&dir))], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");
        assert_eq!(first_payload["details"]["faculties"], 2);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
        assert!(second_payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("certificate_request")));
    });
}

#[test]
fn sweep_all_runs_every_task_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&[("DOCFLOW_DATABASE_URL", &database_url(&dir))], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = sweep::run(SweepMode::All);
        assert_eq!(result.exit_code, 0, "expected sweep success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        let tasks: Vec<&str> = payload["details"]
            .as_array()
            .expect("details array")
            .iter()
            .filter_map(|report| report["task"].as_str())
            .collect();
        assert_eq!(tasks, ["skip_unassigned", "auto_approve", "deadline_check"]);
        assert_eq!(payload["details"][1]["approved"], 0);
    });
}

#[test]
fn doctor_flags_missing_schema_until_migrated() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&[("DOCFLOW_DATABASE_URL", &database_url(&dir))], || {
        let (healthy, output) = doctor::run(true);
        assert!(!healthy);
        let report = parse_payload(&output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][1]["name"], "database_connectivity");
        assert_eq!(report["checks"][1]["status"], "pass");
        assert_eq!(report["checks"][2]["status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);
        let (healthy, output) = doctor::run(false);
        assert!(healthy, "expected healthy report: {output}");
        assert!(output.starts_with("doctor: all readiness checks passed"));
    });
}

fn database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("docflow.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "DOCFLOW_DATABASE_URL",
        "DOCFLOW_DATABASE_MAX_CONNECTIONS",
        "DOCFLOW_DATABASE_TIMEOUT_SECS",
        "DOCFLOW_WORKFLOW_DEFAULT_DEADLINE_HOURS",
        "DOCFLOW_WORKFLOW_REJECT_REASON_MIN_CHARS",
        "DOCFLOW_SCHEDULER_ENABLED",
        "DOCFLOW_REMINDERS_UTC_OFFSET_MINUTES",
        "DOCFLOW_LOGGING_LEVEL",
        "DOCFLOW_LOGGING_FORMAT",
        "DOCFLOW_LOG_LEVEL",
        "DOCFLOW_LOG_FORMAT",
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
