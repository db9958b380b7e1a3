use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use caseflow_cli::commands::rules::RulesAction;
use caseflow_cli::commands::{
    assign, config, lifecycle, migrate, reassign, rules, seed, sla, stats, submit, workload,
};
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("CASEFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failure_for_bad_database_url() {
    with_env(&[("CASEFLOW_DATABASE_URL", "postgres://elsewhere")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_demo_providers_and_rules() {
    with_env(&[("CASEFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("  - provider: prov-tax-001"));
        assert!(message.contains("  - rule: rule-urgent-tax"));
        assert!(message.contains("  - rule: rule-catch-all"));
    });
}

#[test]
fn config_attributes_env_values() {
    with_env(
        &[("CASEFLOW_DATABASE_URL", "sqlite::memory:"), ("CASEFLOW_LOG_LEVEL", "debug")],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let message = payload["message"].as_str().unwrap_or_default();
            assert!(message.contains(
                "- database.url = sqlite::memory: (source: env (CASEFLOW_DATABASE_URL))"
            ));
            assert!(message.contains("- logging.level = debug (source: env (CASEFLOW_LOG_LEVEL))"));
            assert!(message.contains("- sla.warning_window_minutes = 120 (source: default)"));
        },
    );
}

#[test]
fn submitted_request_flows_through_assignment_lifecycle_and_stats() {
    let workspace = Workspace::new();
    let database_url = workspace.database_url();
    with_env(&[("CASEFLOW_DATABASE_URL", database_url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let request_file = workspace.write(
            "request.json",
            json!({
                "subscriber_id": "SUB-100",
                "urgency": "urgent",
                "category": "tax",
                "region": "north",
                "details": {
                    "type": "consultation",
                    "subject": "Quarterly VAT question",
                    "description": "Cross-border invoice"
                }
            }),
        );
        let submitted = submit::run(&request_file);
        assert_eq!(submitted.exit_code, 0, "submit failed: {}", submitted.output);
        let payload = parse_payload(&submitted.output);
        assert_eq!(payload["data"]["assignment"]["provider_id"], "prov-tax-001");
        assert_eq!(payload["data"]["assignment"]["rule_id"], "rule-urgent-tax");
        assert_eq!(payload["data"]["request"]["status"], "assigned");
        let request_id = payload["data"]["request"]["id"].as_str().unwrap_or_default().to_string();

        let repeated = parse_payload(&assign::run(&request_id).output);
        assert_eq!(repeated["data"]["already_assigned"], true);

        let moved = reassign::run(&request_id, "prov-tax-002", "client asked for Jonas", true);
        assert_eq!(moved.exit_code, 0, "reassign failed: {}", moved.output);

        let started = lifecycle::run(&request_id, r#"{"operation":"start"}"#);
        assert_eq!(started.exit_code, 0, "start failed: {}", started.output);
        let ended = parse_payload(&lifecycle::run(&request_id, r#"{"operation":"end"}"#).output);
        assert_eq!(ended["data"]["status"], "completed");

        let load = parse_payload(&workload::run("prov-tax-002").output);
        assert_eq!(load["data"]["active_request_count"], 0);
        assert_eq!(load["data"]["completed_today_count"], 1);

        let history = parse_payload(&stats::run().output);
        assert_eq!(history["data"]["successful"], 2);
        assert_eq!(history["data"]["manual_reassignments"], 1);
    });
}

#[test]
fn assign_retry_matches_rules_on_submitted_extra_attributes() {
    let workspace = Workspace::new();
    let database_url = workspace.database_url();
    with_env(&[("CASEFLOW_DATABASE_URL", database_url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);
        let off = rules::run(RulesAction::Toggle { id: "rule-catch-all".to_string(), active: false });
        assert_eq!(off.exit_code, 0, "toggle failed: {}", off.output);

        let request_file = workspace.write(
            "request.json",
            json!({
                "subscriber_id": "SUB-400",
                "urgency": "normal",
                "category": "civil",
                "details": { "type": "consultation", "subject": "Boundary", "description": "Fence" },
                "attributes": { "language": "fr" }
            }),
        );
        let submitted = parse_payload(&submit::run(&request_file).output);
        assert_eq!(submitted["data"]["request"]["status"], "pending");
        let request_id =
            submitted["data"]["request"]["id"].as_str().unwrap_or_default().to_string();

        let draft = workspace.write(
            "rule.json",
            json!({
                "name": "French civil",
                "priority": 2,
                "active": true,
                "conditions": { "predicates": { "language": { "op": "equals", "value": "fr" } } },
                "target": {
                    "strategy": "pool",
                    "specializations": ["civil"],
                    "requires_certification": false,
                    "region": null,
                    "min_experience_years": null,
                    "max_active_requests": null
                }
            }),
        );
        assert_eq!(rules::run(RulesAction::Add { file: draft }).exit_code, 0);

        let retried = assign::run(&request_id);
        assert_eq!(retried.exit_code, 0, "assign failed: {}", retried.output);
        let payload = parse_payload(&retried.output);
        assert_eq!(payload["data"]["success"], true);
        assert_eq!(payload["data"]["already_assigned"], false);
        assert!(payload["data"]["provider_id"].is_string());
    });
}

#[test]
fn terminal_request_rejects_further_lifecycle_operations() {
    let workspace = Workspace::new();
    let database_url = workspace.database_url();
    with_env(&[("CASEFLOW_DATABASE_URL", database_url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);
        let request_file = workspace.write(
            "request.json",
            json!({
                "subscriber_id": "SUB-300",
                "urgency": "normal",
                "category": "family",
                "details": { "type": "consultation", "subject": "Custody", "description": "Plan" }
            }),
        );
        let payload = parse_payload(&submit::run(&request_file).output);
        let request_id = payload["data"]["request"]["id"].as_str().unwrap_or_default().to_string();

        assert_eq!(lifecycle::run(&request_id, r#"{"operation":"cancel"}"#).exit_code, 0);
        let rejected = lifecycle::run(&request_id, r#"{"operation":"start"}"#);
        assert_eq!(rejected.exit_code, 5);
        assert_eq!(parse_payload(&rejected.output)["error_class"], "invalid_transition");
    });
}

#[test]
fn rules_can_be_added_tested_and_deleted() {
    let workspace = Workspace::new();
    let database_url = workspace.database_url();
    with_env(&[("CASEFLOW_DATABASE_URL", database_url.as_str())], || {
        let draft = workspace.write(
            "rule.json",
            json!({
                "name": "Notary services",
                "priority": 5,
                "active": true,
                "conditions": { "predicates": { "request_type": { "op": "equals", "value": "service" } } },
                "target": {
                    "strategy": "pool",
                    "specializations": ["notary"],
                    "requires_certification": false,
                    "region": null,
                    "min_experience_years": null,
                    "max_active_requests": null
                }
            }),
        );
        let created = rules::run(RulesAction::Add { file: draft });
        assert_eq!(created.exit_code, 0, "add failed: {}", created.output);
        let rule_id =
            parse_payload(&created.output)["data"]["id"].as_str().unwrap_or_default().to_string();

        let sample = workspace.write(
            "sample.json",
            json!({ "request_type": "service", "category": "notary", "urgency": "low", "region": null }),
        );
        let tested =
            parse_payload(&rules::run(RulesAction::Test { id: rule_id.clone(), sample }).output);
        assert_eq!(tested["data"]["matched"], true);
        assert_eq!(tested["data"]["applicable_rule_id"], rule_id.as_str());

        let toggled = rules::run(RulesAction::Toggle { id: rule_id.clone(), active: false });
        assert_eq!(parse_payload(&toggled.output)["data"]["active"], false);

        assert_eq!(rules::run(RulesAction::Delete { id: rule_id.clone() }).exit_code, 0);
        let missing = rules::run(RulesAction::Show { id: rule_id });
        assert_eq!(missing.exit_code, 5);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");
    });
}

#[test]
fn invalid_rule_draft_is_rejected_before_storage() {
    let workspace = Workspace::new();
    let database_url = workspace.database_url();
    with_env(&[("CASEFLOW_DATABASE_URL", database_url.as_str())], || {
        let broken = workspace.write_raw("rule.json", "{ not json");
        let result = rules::run(RulesAction::Add { file: broken });

        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
        let listed = parse_payload(&rules::run(RulesAction::List).output);
        assert_eq!(listed["data"], json!([]));
    });
}

#[test]
fn sla_cycle_reports_counts() {
    with_env(&[("CASEFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = sla::run(false);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sla-cycle");
        assert_eq!(payload["data"]["scanned"], 0);
        assert_eq!(payload["data"]["skipped"], false);
    });
}

#[test]
fn reassign_requires_a_reason() {
    with_env(&[("CASEFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = reassign::run("req-1", "prov-tax-001", "  ", false);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self { dir: TempDir::new().expect("temp dir") }
    }

    fn database_url(&self) -> String {
        format!("sqlite://{}", self.dir.path().join("caseflow.db").display())
    }

    fn write(&self, name: &str, value: Value) -> PathBuf {
        self.write_raw(name, &value.to_string())
    }

    fn write_raw(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write input file");
        path
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CASEFLOW_DATABASE_URL",
        "CASEFLOW_DATABASE_MAX_CONNECTIONS",
        "CASEFLOW_DATABASE_TIMEOUT_SECS",
        "CASEFLOW_LOGGING_LEVEL",
        "CASEFLOW_LOGGING_FORMAT",
        "CASEFLOW_LOG_LEVEL",
        "CASEFLOW_LOG_FORMAT",
        "CASEFLOW_SLA_WARNING_WINDOW_MINUTES",
        "CASEFLOW_SLA_RECONCILE_INTERVAL_SECS",
        "CASEFLOW_ASSIGNMENT_TIMEOUT_MS",
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
