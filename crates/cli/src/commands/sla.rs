use caseflow_core::sla::SlaCycleReport;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::commands::context::{execute, Services};
use crate::commands::CommandResult;

/// Runs one SLA reconciliation cycle, or with `watch` keeps running cycles on
/// the configured interval until interrupted.
pub fn run(watch: bool) -> CommandResult {
    let result = execute("sla-cycle", |config| async move {
        let services = Services::open(&config).await?;

        let report = if watch {
            let mut totals = WatchTotals::default();
            let mut interval = tokio::time::interval(config.reconcile_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                event_name = "sla.watch.started",
                interval_secs = config.sla.reconcile_interval_secs,
                "SLA reconciler running"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match services.reconciler.run_cycle(Utc::now()).await {
                            Ok(report) => totals.add(&report),
                            // the next tick retries
                            Err(error) => warn!(
                                event_name = "sla.cycle.failed",
                                error = %error,
                                "SLA cycle could not list active requests"
                            ),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            info!(event_name = "sla.watch.stopped", cycles = totals.cycles, "SLA reconciler stopped");
            totals.report
        } else {
            services
                .reconciler
                .run_cycle(Utc::now())
                .await
                .map_err(|error| ("persistence", error.to_string(), 5u8))?
        };

        services.close().await;
        Ok(report)
    });

    match result {
        Ok(report) => CommandResult::success_with(
            "sla-cycle",
            format!(
                "scanned {}, updated {}, notified {}, failed {}",
                report.scanned, report.updated, report.notified, report.failed
            ),
            report,
        ),
        Err(failure) => failure,
    }
}

#[derive(Default)]
struct WatchTotals {
    cycles: u64,
    report: SlaCycleReport,
}

impl WatchTotals {
    fn add(&mut self, cycle: &SlaCycleReport) {
        self.cycles += 1;
        self.report.scanned += cycle.scanned;
        self.report.updated += cycle.updated;
        self.report.notified += cycle.notified;
        self.report.failed += cycle.failed;
    }
}
