use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use docflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Keys rendered by `docflow config`, with the env var that overrides each.
const FIELDS: &[(&str, &str)] = &[
    ("database.url", "DOCFLOW_DATABASE_URL"),
    ("database.max_connections", "DOCFLOW_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "DOCFLOW_DATABASE_TIMEOUT_SECS"),
    ("server.bind_address", "DOCFLOW_SERVER_BIND_ADDRESS"),
    ("server.health_check_port", "DOCFLOW_SERVER_HEALTH_CHECK_PORT"),
    ("server.graceful_shutdown_secs", "DOCFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("workflow.default_deadline_hours", "DOCFLOW_WORKFLOW_DEFAULT_DEADLINE_HOURS"),
    ("workflow.reject_reason_min_chars", "DOCFLOW_WORKFLOW_REJECT_REASON_MIN_CHARS"),
    ("scheduler.enabled", "DOCFLOW_SCHEDULER_ENABLED"),
    ("scheduler.auto_approve_interval_secs", "DOCFLOW_SCHEDULER_AUTO_APPROVE_INTERVAL_SECS"),
    ("scheduler.deadline_check_interval_secs", "DOCFLOW_SCHEDULER_DEADLINE_CHECK_INTERVAL_SECS"),
    ("scheduler.skip_unassigned_interval_secs", "DOCFLOW_SCHEDULER_SKIP_UNASSIGNED_INTERVAL_SECS"),
    ("reminders.quiet_start_hour", "DOCFLOW_REMINDERS_QUIET_START_HOUR"),
    ("reminders.quiet_end_hour", "DOCFLOW_REMINDERS_QUIET_END_HOUR"),
    ("reminders.evening_cutoff_hour", "DOCFLOW_REMINDERS_EVENING_CUTOFF_HOUR"),
    ("reminders.utc_offset_minutes", "DOCFLOW_REMINDERS_UTC_OFFSET_MINUTES"),
    ("reminders.retention_days", "DOCFLOW_REMINDERS_RETENTION_DAYS"),
    ("logging.level", "DOCFLOW_LOGGING_LEVEL"),
    ("logging.format", "DOCFLOW_LOGGING_FORMAT"),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key) in FIELDS {
        let value = effective_value(&config, key);
        let source =
            field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn effective_value(config: &AppConfig, key: &str) -> String {
    match key {
        "database.url" => config.database.url.clone(),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "server.bind_address" => config.server.bind_address.clone(),
        "server.health_check_port" => config.server.health_check_port.to_string(),
        "server.graceful_shutdown_secs" => config.server.graceful_shutdown_secs.to_string(),
        "workflow.default_deadline_hours" => config.workflow.default_deadline_hours.to_string(),
        "workflow.reject_reason_min_chars" => config.workflow.reject_reason_min_chars.to_string(),
        "scheduler.enabled" => config.scheduler.enabled.to_string(),
        "scheduler.auto_approve_interval_secs" => {
            config.scheduler.auto_approve_interval_secs.to_string()
        }
        "scheduler.deadline_check_interval_secs" => {
            config.scheduler.deadline_check_interval_secs.to_string()
        }
        "scheduler.skip_unassigned_interval_secs" => {
            config.scheduler.skip_unassigned_interval_secs.to_string()
        }
        "reminders.quiet_start_hour" => config.reminders.quiet_start_hour.to_string(),
        "reminders.quiet_end_hour" => config.reminders.quiet_end_hour.to_string(),
        "reminders.evening_cutoff_hour" => config.reminders.evening_cutoff_hour.to_string(),
        "reminders.utc_offset_minutes" => config.reminders.utc_offset_minutes.to_string(),
        "reminders.retention_days" => config.reminders.retention_days.to_string(),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => format!("{:?}", config.logging.format),
        _ => "<unknown>".to_string(),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("docflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/docflow.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
