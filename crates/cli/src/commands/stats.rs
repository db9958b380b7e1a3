use crate::commands::context::{application_failure, execute, Services};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let result = execute("stats", |config| async move {
        let services = Services::open(&config).await?;
        let stats = services.engine.get_routing_stats().await.map_err(application_failure)?;
        services.close().await;
        Ok(stats)
    });

    match result {
        Ok(stats) => CommandResult::success_with(
            "stats",
            format!(
                "{} assignment attempts: {} successful, {} failed, {} manual",
                stats.total_attempts, stats.successful, stats.failed, stats.manual_reassignments
            ),
            stats,
        ),
        Err(failure) => failure,
    }
}
