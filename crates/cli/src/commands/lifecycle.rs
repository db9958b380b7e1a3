use caseflow_core::domain::request::RequestId;
use caseflow_core::lifecycle::LifecycleOperation;
use chrono::Utc;

use crate::commands::context::{application_failure, execute, Services};
use crate::commands::CommandResult;

/// Applies one lifecycle operation given as JSON, e.g.
/// `{"operation":"schedule","at":"2026-03-02T10:00:00Z","call_link":null}`.
pub fn run(request_id: &str, operation: &str) -> CommandResult {
    let operation: LifecycleOperation = match serde_json::from_str(operation) {
        Ok(operation) => operation,
        Err(error) => {
            return CommandResult::failure(
                "lifecycle",
                "invalid_input",
                format!("invalid lifecycle operation: {error}"),
                2,
            );
        }
    };
    let name = operation.name();

    let result = execute("lifecycle", |config| async move {
        let services = Services::open(&config).await?;
        let request = services
            .lifecycle
            .apply(&RequestId(request_id.to_string()), operation, Utc::now())
            .await
            .map_err(application_failure)?;
        services.close().await;
        Ok(request)
    });

    match result {
        Ok(request) => CommandResult::success_with(
            "lifecycle",
            format!("{name} applied; request {} is {}", request.number.0, request.status.as_str()),
            request,
        ),
        Err(failure) => failure,
    }
}
