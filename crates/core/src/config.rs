use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub scheduler: SchedulerConfig,
    pub reminders: ReminderConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Used when a document type does not carry its own deadline.
    pub default_deadline_hours: u32,
    pub reject_reason_min_chars: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub auto_approve_interval_secs: u64,
    pub deadline_check_interval_secs: u64,
    pub skip_unassigned_interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderConfig {
    pub upcoming_window_hours: u32,
    pub upcoming_repeat_hours: u32,
    pub urgent_window_hours: u32,
    pub urgent_repeat_hours: u32,
    pub quiet_start_hour: u32,
    pub quiet_end_hour: u32,
    pub evening_cutoff_hour: u32,
    pub utc_offset_minutes: i32,
    /// Sent-reminder ledger rows older than this are pruned by the deadline sweep.
    pub retention_days: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub scheduler_enabled: Option<bool>,
    pub reject_reason_min_chars: Option<usize>,
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://docflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            workflow: WorkflowConfig::default(),
            scheduler: SchedulerConfig::default(),
            reminders: ReminderConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { default_deadline_hours: 48, reject_reason_min_chars: 5 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_approve_interval_secs: 3600,
            deadline_check_interval_secs: 1800,
            skip_unassigned_interval_secs: 3600,
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            upcoming_window_hours: 24,
            upcoming_repeat_hours: 12,
            urgent_window_hours: 2,
            urgent_repeat_hours: 1,
            quiet_start_hour: 23,
            quiet_end_hour: 6,
            evening_cutoff_hour: 21,
            utc_offset_minutes: 0,
            retention_days: 90,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("docflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(hours) = workflow.default_deadline_hours {
                self.workflow.default_deadline_hours = hours;
            }
            if let Some(min_chars) = workflow.reject_reason_min_chars {
                self.workflow.reject_reason_min_chars = min_chars;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(enabled) = scheduler.enabled {
                self.scheduler.enabled = enabled;
            }
            if let Some(secs) = scheduler.auto_approve_interval_secs {
                self.scheduler.auto_approve_interval_secs = secs;
            }
            if let Some(secs) = scheduler.deadline_check_interval_secs {
                self.scheduler.deadline_check_interval_secs = secs;
            }
            if let Some(secs) = scheduler.skip_unassigned_interval_secs {
                self.scheduler.skip_unassigned_interval_secs = secs;
            }
        }

        if let Some(reminders) = patch.reminders {
            let target = &mut self.reminders;
            if let Some(value) = reminders.upcoming_window_hours {
                target.upcoming_window_hours = value;
            }
            if let Some(value) = reminders.upcoming_repeat_hours {
                target.upcoming_repeat_hours = value;
            }
            if let Some(value) = reminders.urgent_window_hours {
                target.urgent_window_hours = value;
            }
            if let Some(value) = reminders.urgent_repeat_hours {
                target.urgent_repeat_hours = value;
            }
            if let Some(value) = reminders.quiet_start_hour {
                target.quiet_start_hour = value;
            }
            if let Some(value) = reminders.quiet_end_hour {
                target.quiet_end_hour = value;
            }
            if let Some(value) = reminders.evening_cutoff_hour {
                target.evening_cutoff_hour = value;
            }
            if let Some(value) = reminders.utc_offset_minutes {
                target.utc_offset_minutes = value;
            }
            if let Some(value) = reminders.retention_days {
                target.retention_days = value;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DOCFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DOCFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("DOCFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("DOCFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DOCFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DOCFLOW_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_env("DOCFLOW_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("DOCFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("DOCFLOW_WORKFLOW_DEFAULT_DEADLINE_HOURS") {
            self.workflow.default_deadline_hours =
                parse_env("DOCFLOW_WORKFLOW_DEFAULT_DEADLINE_HOURS", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_WORKFLOW_REJECT_REASON_MIN_CHARS") {
            self.workflow.reject_reason_min_chars =
                parse_env("DOCFLOW_WORKFLOW_REJECT_REASON_MIN_CHARS", &value)?;
        }

        if let Some(value) = read_env("DOCFLOW_SCHEDULER_ENABLED") {
            self.scheduler.enabled = parse_env("DOCFLOW_SCHEDULER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_SCHEDULER_AUTO_APPROVE_INTERVAL_SECS") {
            self.scheduler.auto_approve_interval_secs =
                parse_env("DOCFLOW_SCHEDULER_AUTO_APPROVE_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_SCHEDULER_DEADLINE_CHECK_INTERVAL_SECS") {
            self.scheduler.deadline_check_interval_secs =
                parse_env("DOCFLOW_SCHEDULER_DEADLINE_CHECK_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_SCHEDULER_SKIP_UNASSIGNED_INTERVAL_SECS") {
            self.scheduler.skip_unassigned_interval_secs =
                parse_env("DOCFLOW_SCHEDULER_SKIP_UNASSIGNED_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("DOCFLOW_REMINDERS_QUIET_START_HOUR") {
            self.reminders.quiet_start_hour =
                parse_env("DOCFLOW_REMINDERS_QUIET_START_HOUR", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_REMINDERS_QUIET_END_HOUR") {
            self.reminders.quiet_end_hour = parse_env("DOCFLOW_REMINDERS_QUIET_END_HOUR", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_REMINDERS_EVENING_CUTOFF_HOUR") {
            self.reminders.evening_cutoff_hour =
                parse_env("DOCFLOW_REMINDERS_EVENING_CUTOFF_HOUR", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_REMINDERS_UTC_OFFSET_MINUTES") {
            self.reminders.utc_offset_minutes =
                parse_env("DOCFLOW_REMINDERS_UTC_OFFSET_MINUTES", &value)?;
        }
        if let Some(value) = read_env("DOCFLOW_REMINDERS_RETENTION_DAYS") {
            self.reminders.retention_days = parse_env("DOCFLOW_REMINDERS_RETENTION_DAYS", &value)?;
        }

        let log_level =
            read_env("DOCFLOW_LOGGING_LEVEL").or_else(|| read_env("DOCFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DOCFLOW_LOGGING_FORMAT").or_else(|| read_env("DOCFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.scheduler_enabled {
            self.scheduler.enabled = enabled;
        }
        if let Some(min_chars) = overrides.reject_reason_min_chars {
            self.workflow.reject_reason_min_chars = min_chars;
        }
        if let Some(offset) = overrides.utc_offset_minutes {
            self.reminders.utc_offset_minutes = offset;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_workflow(&self.workflow)?;
        validate_scheduler(&self.scheduler)?;
        validate_reminders(&self.reminders)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("docflow.toml"), PathBuf::from("config/docflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.default_deadline_hours == 0 {
        return Err(ConfigError::Validation(
            "workflow.default_deadline_hours must be greater than zero".to_string(),
        ));
    }

    if workflow.reject_reason_min_chars == 0 {
        return Err(ConfigError::Validation(
            "workflow.reject_reason_min_chars must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    let intervals = [
        ("scheduler.auto_approve_interval_secs", scheduler.auto_approve_interval_secs),
        ("scheduler.deadline_check_interval_secs", scheduler.deadline_check_interval_secs),
        ("scheduler.skip_unassigned_interval_secs", scheduler.skip_unassigned_interval_secs),
    ];
    for (key, value) in intervals {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
        }
    }

    Ok(())
}

fn validate_reminders(reminders: &ReminderConfig) -> Result<(), ConfigError> {
    let hours = [
        ("reminders.quiet_start_hour", reminders.quiet_start_hour),
        ("reminders.quiet_end_hour", reminders.quiet_end_hour),
        ("reminders.evening_cutoff_hour", reminders.evening_cutoff_hour),
    ];
    for (key, value) in hours {
        if value > 23 {
            return Err(ConfigError::Validation(format!("{key} must be in range 0..=23")));
        }
    }

    if reminders.urgent_window_hours == 0 || reminders.upcoming_window_hours == 0 {
        return Err(ConfigError::Validation(
            "reminder windows must be greater than zero".to_string(),
        ));
    }

    if reminders.urgent_window_hours >= reminders.upcoming_window_hours {
        return Err(ConfigError::Validation(
            "reminders.urgent_window_hours must be shorter than reminders.upcoming_window_hours"
                .to_string(),
        ));
    }

    if reminders.utc_offset_minutes.abs() > 14 * 60 {
        return Err(ConfigError::Validation(
            "reminders.utc_offset_minutes must be within +/-840".to_string(),
        ));
    }

    let longest_repeat = reminders.upcoming_repeat_hours.max(reminders.urgent_repeat_hours);
    if u64::from(reminders.retention_days) * 24 < u64::from(longest_repeat) {
        return Err(ConfigError::Validation(
            "reminders.retention_days must cover the longest reminder repeat interval".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    workflow: Option<WorkflowPatch>,
    scheduler: Option<SchedulerPatch>,
    reminders: Option<ReminderPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    default_deadline_hours: Option<u32>,
    reject_reason_min_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    enabled: Option<bool>,
    auto_approve_interval_secs: Option<u64>,
    deadline_check_interval_secs: Option<u64>,
    skip_unassigned_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReminderPatch {
    upcoming_window_hours: Option<u32>,
    upcoming_repeat_hours: Option<u32>,
    urgent_window_hours: Option<u32>,
    urgent_repeat_hours: Option<u32>,
    quiet_start_hour: Option<u32>,
    quiet_end_hour: Option<u32>,
    evening_cutoff_hour: Option<u32>,
    utc_offset_minutes: Option<i32>,
    retention_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
