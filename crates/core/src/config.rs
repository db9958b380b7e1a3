use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::{RequestType, Urgency};
use crate::sla::SlaClock;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub sla: SlaConfig,
    pub assignment: AssignmentConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct SlaConfig {
    pub warning_window_minutes: u32,
    pub reconcile_interval_secs: u64,
    /// Overrides of the standard deadline table keyed `"<type>.<urgency>"`,
    /// e.g. `"call.urgent" = 1`.
    pub hours: BTreeMap<String, u32>,
}

#[derive(Clone, Debug)]
pub struct AssignmentConfig {
    pub timeout_ms: u64,
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
    pub log_format: Option<LogFormat>,
    pub sla_warning_window_minutes: Option<u32>,
    pub assignment_timeout_ms: Option<u64>,
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
                url: "sqlite://caseflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            sla: SlaConfig {
                warning_window_minutes: 120,
                reconcile_interval_secs: 300,
                hours: BTreeMap::new(),
            },
            assignment: AssignmentConfig { timeout_ms: 5_000 },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("caseflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Standard deadline table with the configured overrides applied.
    pub fn sla_clock(&self) -> Result<SlaClock, ConfigError> {
        let overrides = parse_sla_hours(&self.sla.hours)?;
        let window = chrono::Duration::minutes(i64::from(self.sla.warning_window_minutes));
        SlaClock::with_overrides(&overrides, window)
            .map_err(|error| ConfigError::Validation(format!("sla: {error}")))
    }

    pub fn assignment_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.assignment.timeout_ms)
    }

    pub fn reconcile_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sla.reconcile_interval_secs)
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

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(sla) = patch.sla {
            if let Some(minutes) = sla.warning_window_minutes {
                self.sla.warning_window_minutes = minutes;
            }
            if let Some(interval) = sla.reconcile_interval_secs {
                self.sla.reconcile_interval_secs = interval;
            }
            if let Some(hours) = sla.hours {
                self.sla.hours.extend(hours);
            }
        }

        if let Some(assignment) = patch.assignment {
            if let Some(timeout_ms) = assignment.timeout_ms {
                self.assignment.timeout_ms = timeout_ms;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CASEFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CASEFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CASEFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CASEFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CASEFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("CASEFLOW_LOGGING_LEVEL").or_else(|| read_env("CASEFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CASEFLOW_LOGGING_FORMAT").or_else(|| read_env("CASEFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("CASEFLOW_SLA_WARNING_WINDOW_MINUTES") {
            self.sla.warning_window_minutes =
                parse_u32("CASEFLOW_SLA_WARNING_WINDOW_MINUTES", &value)?;
        }
        if let Some(value) = read_env("CASEFLOW_SLA_RECONCILE_INTERVAL_SECS") {
            self.sla.reconcile_interval_secs =
                parse_u64("CASEFLOW_SLA_RECONCILE_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("CASEFLOW_ASSIGNMENT_TIMEOUT_MS") {
            self.assignment.timeout_ms = parse_u64("CASEFLOW_ASSIGNMENT_TIMEOUT_MS", &value)?;
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
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(minutes) = overrides.sla_warning_window_minutes {
            self.sla.warning_window_minutes = minutes;
        }
        if let Some(timeout_ms) = overrides.assignment_timeout_ms {
            self.assignment.timeout_ms = timeout_ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_sla(&self.sla)?;
        validate_assignment(&self.assignment)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("caseflow.toml"), PathBuf::from("config/caseflow.toml")]
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

fn parse_sla_hours(
    raw: &BTreeMap<String, u32>,
) -> Result<BTreeMap<(RequestType, Urgency), u32>, ConfigError> {
    let mut parsed = BTreeMap::new();
    for (key, hours) in raw {
        let (request_type, urgency) = key
            .split_once('.')
            .and_then(|(request_type, urgency)| {
                Some((RequestType::parse(request_type)?, Urgency::parse(urgency)?))
            })
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "sla.hours key `{key}` must look like `<request_type>.<urgency>`"
                ))
            })?;
        parsed.insert((request_type, urgency), *hours);
    }
    Ok(parsed)
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

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_sla(sla: &SlaConfig) -> Result<(), ConfigError> {
    if sla.reconcile_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sla.reconcile_interval_secs must be greater than zero".to_string(),
        ));
    }

    let overrides = parse_sla_hours(&sla.hours)?;
    if let Some(((request_type, urgency), _)) = overrides.iter().find(|(_, hours)| **hours == 0) {
        return Err(ConfigError::Validation(format!(
            "sla.hours for `{}.{}` must be greater than zero",
            request_type.as_str(),
            urgency.as_str()
        )));
    }

    Ok(())
}

fn validate_assignment(assignment: &AssignmentConfig) -> Result<(), ConfigError> {
    if assignment.timeout_ms == 0 || assignment.timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "assignment.timeout_ms must be in range 1..=60000".to_string(),
        ));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    sla: Option<SlaPatch>,
    assignment: Option<AssignmentPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct SlaPatch {
    warning_window_minutes: Option<u32>,
    reconcile_interval_secs: Option<u64>,
    hours: Option<BTreeMap<String, u32>>,
}

#[derive(Debug, Default, Deserialize)]
struct AssignmentPatch {
    timeout_ms: Option<u64>,
}
