use caseflow_core::assignment::ReassignOptions;
use caseflow_core::domain::provider::ProviderId;
use caseflow_core::domain::request::RequestId;
use chrono::Utc;

use crate::commands::context::{application_failure, execute, Services};
use crate::commands::CommandResult;

pub fn run(
    request_id: &str,
    provider_id: &str,
    reason: &str,
    recompute_deadline: bool,
) -> CommandResult {
    if reason.trim().is_empty() {
        return CommandResult::failure(
            "reassign",
            "invalid_input",
            "a reassignment reason is required",
            2,
        );
    }

    let result = execute("reassign", |config| async move {
        let services = Services::open(&config).await?;
        let mut options = ReassignOptions::at(Utc::now());
        if recompute_deadline {
            options = options.recompute_deadline();
        }

        let assignment = services
            .engine
            .reassign(
                &RequestId(request_id.to_string()),
                &ProviderId(provider_id.to_string()),
                reason.trim(),
                options,
            )
            .await
            .map_err(application_failure)?;
        services.close().await;
        Ok(assignment)
    });

    match result {
        Ok(assignment) => CommandResult::success_with(
            "reassign",
            format!("request {request_id} reassigned to {provider_id}"),
            assignment,
        ),
        Err(failure) => failure,
    }
}
