use caseflow_core::domain::provider::ProviderId;
use chrono::Utc;

use crate::commands::context::{application_failure, execute, Services};
use crate::commands::CommandResult;

pub fn run(provider_id: &str) -> CommandResult {
    let result = execute("workload", |config| async move {
        let services = Services::open(&config).await?;
        let workload = services
            .engine
            .get_provider_workload(&ProviderId(provider_id.to_string()), Utc::now())
            .await
            .map_err(application_failure)?;
        services.close().await;
        Ok(workload)
    });

    match result {
        Ok(workload) => CommandResult::success_with(
            "workload",
            format!(
                "{}: {} active, {} completed today",
                workload.provider_id.0, workload.active_request_count, workload.completed_today_count
            ),
            workload,
        ),
        Err(failure) => failure,
    }
}
