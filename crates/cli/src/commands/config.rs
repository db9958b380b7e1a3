use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use caseflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    CommandResult::success("config", render(&config))
}

/// One line per effective setting with the layer it came from.
pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let sla_hours = if config.sla.hours.is_empty() {
        "<standard table>".to_string()
    } else {
        config
            .sla
            .hours
            .iter()
            .map(|(key, hours)| format!("{key}={hours}h"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let entries: [(&str, String, &[&str]); 9] = [
        ("database.url", config.database.url.clone(), &["CASEFLOW_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["CASEFLOW_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["CASEFLOW_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["CASEFLOW_LOGGING_LEVEL", "CASEFLOW_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CASEFLOW_LOGGING_FORMAT", "CASEFLOW_LOG_FORMAT"],
        ),
        (
            "sla.warning_window_minutes",
            config.sla.warning_window_minutes.to_string(),
            &["CASEFLOW_SLA_WARNING_WINDOW_MINUTES"],
        ),
        (
            "sla.reconcile_interval_secs",
            config.sla.reconcile_interval_secs.to_string(),
            &["CASEFLOW_SLA_RECONCILE_INTERVAL_SECS"],
        ),
        ("sla.hours", sla_hours, &[]),
        (
            "assignment.timeout_ms",
            config.assignment.timeout_ms.to_string(),
            &["CASEFLOW_ASSIGNMENT_TIMEOUT_MS"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .iter()
            .map(|(key, value, env_keys)| render_line(key, value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["caseflow.toml", "config/caseflow.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
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
