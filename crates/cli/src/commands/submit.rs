use std::path::Path;

use caseflow_core::intake::NewRequest;
use chrono::Utc;

use crate::commands::context::{application_failure, execute, input_failure, read_json, Services};
use crate::commands::CommandResult;

/// Creates a request from a JSON file and auto-assigns it. An assignment
/// failure still exits 0; the request is left pending.
pub fn run(file: &Path) -> CommandResult {
    let result = execute("submit", |config| async move {
        let new_request: NewRequest = read_json(file).map_err(input_failure)?;
        let services = Services::open(&config).await?;
        let submitted =
            services.intake.submit(new_request, Utc::now()).await.map_err(application_failure)?;
        services.close().await;
        Ok(submitted)
    });

    match result {
        Ok(submitted) => {
            let message = match &submitted.assignment.provider_id {
                Some(provider) if submitted.assignment.success => format!(
                    "request {} assigned to {}",
                    submitted.request.number.0, provider.0
                ),
                _ => format!("request {} created and left pending", submitted.request.number.0),
            };
            CommandResult::success_with("submit", message, submitted)
        }
        Err(failure) => failure,
    }
}
