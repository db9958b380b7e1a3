use caseflow_core::domain::request::RequestId;

use crate::commands::context::{application_failure, execute, Services};
use crate::commands::CommandResult;

/// Retries auto-assignment for a stored request.
pub fn run(request_id: &str) -> CommandResult {
    let result = execute("assign", |config| async move {
        let services = Services::open(&config).await?;
        let id = RequestId(request_id.to_string());
        let request = services.load_request(&id).await.map_err(application_failure)?;
        let assignment = services
            .engine
            .auto_assign(&id, &request.attributes())
            .await
            .map_err(application_failure)?;
        services.close().await;
        Ok(assignment)
    });

    match result {
        Ok(assignment) => {
            let message = match (&assignment.provider_id, assignment.already_assigned) {
                (Some(provider), true) => format!("request already assigned to {}", provider.0),
                (Some(provider), false) => format!("request assigned to {}", provider.0),
                (None, _) => format!(
                    "no provider assigned ({})",
                    assignment.reason.map(|reason| reason.as_str()).unwrap_or("unknown")
                ),
            };
            CommandResult::success_with("assign", message, assignment)
        }
        Err(failure) => failure,
    }
}
