use std::path::PathBuf;

use caseflow_core::domain::request::RequestAttributes;
use caseflow_core::domain::routing::{RuleDraft, RuleId};
use chrono::Utc;

use crate::commands::context::{application_failure, execute, input_failure, read_json, Services};
use crate::commands::CommandResult;

#[derive(Debug, Clone)]
pub enum RulesAction {
    List,
    Show { id: String },
    Add { file: PathBuf },
    Update { id: String, file: PathBuf },
    Toggle { id: String, active: bool },
    Delete { id: String },
    Test { id: String, sample: PathBuf },
}

pub fn run(action: RulesAction) -> CommandResult {
    let command = match &action {
        RulesAction::List => "rules.list",
        RulesAction::Show { .. } => "rules.show",
        RulesAction::Add { .. } => "rules.add",
        RulesAction::Update { .. } => "rules.update",
        RulesAction::Toggle { .. } => "rules.toggle",
        RulesAction::Delete { .. } => "rules.delete",
        RulesAction::Test { .. } => "rules.test",
    };

    let result = execute(command, |config| async move {
        let services = Services::open(&config).await?;
        let catalog = &services.catalog;
        let now = Utc::now();

        let outcome = match action {
            RulesAction::List => {
                let rules = catalog.list().await.map_err(application_failure)?;
                (format!("{} routing rule(s)", rules.len()), serde_json::to_value(rules))
            }
            RulesAction::Show { id } => {
                let rule = catalog.get(&RuleId(id)).await.map_err(application_failure)?;
                (format!("routing rule {}", rule.id.0), serde_json::to_value(rule))
            }
            RulesAction::Add { file } => {
                let draft: RuleDraft = read_json(&file).map_err(input_failure)?;
                let rule = catalog.create(draft, now).await.map_err(application_failure)?;
                (format!("created routing rule {}", rule.id.0), serde_json::to_value(rule))
            }
            RulesAction::Update { id, file } => {
                let draft: RuleDraft = read_json(&file).map_err(input_failure)?;
                let rule =
                    catalog.update(&RuleId(id), draft, now).await.map_err(application_failure)?;
                (format!("updated routing rule {}", rule.id.0), serde_json::to_value(rule))
            }
            RulesAction::Toggle { id, active } => {
                let rule = catalog
                    .toggle_active(&RuleId(id), active, now)
                    .await
                    .map_err(application_failure)?;
                let state = if rule.active { "active" } else { "inactive" };
                (format!("routing rule {} is now {state}", rule.id.0), serde_json::to_value(rule))
            }
            RulesAction::Delete { id } => {
                let id = RuleId(id);
                catalog.delete(&id, now).await.map_err(application_failure)?;
                (format!("deleted routing rule {}", id.0), Ok(serde_json::Value::Null))
            }
            RulesAction::Test { id, sample } => {
                let sample: RequestAttributes = read_json(&sample).map_err(input_failure)?;
                let report =
                    catalog.test(&RuleId(id), &sample).await.map_err(application_failure)?;
                let verdict = match (report.matched, report.is_shadowed()) {
                    (false, _) => "does not match the sample",
                    (true, true) => "matches the sample but another rule would be applied",
                    (true, false) => "matches the sample and would be applied",
                };
                (format!("routing rule {} {verdict}", report.rule_id.0), serde_json::to_value(report))
            }
        };

        services.close().await;
        let (message, data) = outcome;
        let data = data.map_err(|error| ("serialization", error.to_string(), 5u8))?;
        Ok((message, data))
    });

    match result {
        Ok((message, serde_json::Value::Null)) => CommandResult::success(command, message),
        Ok((message, data)) => CommandResult::success_with(command, message, data),
        Err(failure) => failure,
    }
}
