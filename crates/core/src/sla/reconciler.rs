use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::best_effort::BestEffort;
use crate::domain::request::ServiceRequest;
use crate::notify::NotificationEvent;
use crate::ports::{NotificationSink, PortError, RequestRepository};
use crate::sla::clock::SlaClock;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaCycleReport {
    pub scanned: usize,
    pub updated: usize,
    pub notified: usize,
    pub failed: usize,
    /// True when another cycle was already running and this one did nothing.
    pub skipped: bool,
}

enum RequestOutcome {
    Unchanged,
    Updated { notified: bool },
}

/// Periodically reclassifies the SLA status of every non-terminal request.
pub struct SlaReconciler {
    requests: Arc<dyn RequestRepository>,
    notifications: Arc<dyn NotificationSink>,
    clock: SlaClock,
    cycle_guard: Mutex<()>,
}

impl SlaReconciler {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        notifications: Arc<dyn NotificationSink>,
        clock: SlaClock,
    ) -> Self {
        Self { requests, notifications, clock, cycle_guard: Mutex::new(()) }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<SlaCycleReport, PortError> {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            info!(event_name = "sla.cycle.skipped", "previous SLA cycle still running");
            return Ok(SlaCycleReport { skipped: true, ..SlaCycleReport::default() });
        };

        let active = self.requests.list_active().await?;
        let mut report = SlaCycleReport { scanned: active.len(), ..SlaCycleReport::default() };

        for request in active {
            match self.reconcile_one(&request, now).await {
                Ok(RequestOutcome::Unchanged) => {}
                Ok(RequestOutcome::Updated { notified }) => {
                    report.updated += 1;
                    if notified {
                        report.notified += 1;
                    }
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        event_name = "sla.request.failed",
                        request_id = %request.id.0,
                        error = %error,
                        "SLA reconciliation failed for request"
                    );
                }
            }
        }

        info!(
            event_name = "sla.cycle.finished",
            scanned = report.scanned,
            updated = report.updated,
            notified = report.notified,
            failed = report.failed,
            "SLA cycle finished"
        );
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        request: &ServiceRequest,
        now: DateTime<Utc>,
    ) -> Result<RequestOutcome, PortError> {
        let next = self.clock.reclassify(request.sla_status, now, request.sla_deadline);
        if next == request.sla_status {
            return Ok(RequestOutcome::Unchanged);
        }

        let written = self.requests.update_sla(&request.id, request.sla_status, next, None, now).await?;
        if !written {
            debug!(
                event_name = "sla.request.stale",
                request_id = %request.id.0,
                "SLA status changed concurrently; leaving it to the next cycle"
            );
            return Ok(RequestOutcome::Unchanged);
        }

        let Some(event) = NotificationEvent::for_sla_change(
            request.id.clone(),
            request.assigned_provider_id.clone(),
            next,
            request.sla_deadline,
            now,
        ) else {
            return Ok(RequestOutcome::Updated { notified: false });
        };

        let delivered =
            BestEffort::run("sla.notify", self.notifications.notify(&event)).await.is_completed();
        Ok(RequestOutcome::Updated { notified: delivered })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use super::SlaReconciler;
    use crate::domain::request::{
        ConsultationDetails, RequestDetails, RequestId, RequestNumber, RequestStatus,
        ServiceRequest, SlaStatus, SubscriberId, Urgency,
    };
    use crate::notify::{InMemoryNotificationSink, NotificationEvent};
    use crate::ports::{InMemoryRequestStore, RequestRepository};
    use crate::sla::SlaClock;

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn request(id: &str, status: RequestStatus, deadline: DateTime<Utc>) -> ServiceRequest {
        let submitted = deadline - Duration::hours(24);
        ServiceRequest {
            id: RequestId(id.to_string()),
            number: RequestNumber(format!("CON-20260301-{id}")),
            subscriber_id: SubscriberId("SUB-1".to_string()),
            assigned_provider_id: None,
            urgency: Urgency::Normal,
            status,
            category: "consultation".to_string(),
            region: None,
            extra_attributes: Default::default(),
            details: RequestDetails::Consultation(ConsultationDetails {
                subject: "s".to_string(),
                description: "d".to_string(),
            }),
            submitted_at: submitted,
            sla_deadline: deadline,
            sla_status: SlaStatus::OnTrack,
            completed_at: None,
            created_at: submitted,
            updated_at: submitted,
        }
    }

    async fn seeded(now: DateTime<Utc>) -> Arc<InMemoryRequestStore> {
        let store = Arc::new(InMemoryRequestStore::default());
        for request in [
            request("R-1", RequestStatus::Pending, now + Duration::hours(10)),
            request("R-2", RequestStatus::Pending, now + Duration::hours(1)),
            request("R-3", RequestStatus::Pending, now - Duration::minutes(1)),
            request("R-4", RequestStatus::Cancelled, now - Duration::hours(3)),
        ] {
            store.insert(request).await.expect("insert");
        }
        store
    }

    #[tokio::test]
    async fn cycle_updates_changed_statuses_and_notifies() {
        let now = ts("2026-03-02T12:00:00Z");
        let store = seeded(now).await;
        let sink = InMemoryNotificationSink::default();
        let reconciler =
            SlaReconciler::new(store.clone(), Arc::new(sink.clone()), SlaClock::standard());

        let report = reconciler.run_cycle(now).await.expect("cycle");

        assert_eq!(report.scanned, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.notified, 2);
        assert_eq!(report.failed, 0);
        let kinds: Vec<&str> = sink.events().iter().map(NotificationEvent::kind).collect();
        assert_eq!(kinds, vec!["sla_at_risk", "sla_breached"]);

        let terminal = store.find_by_id(&RequestId("R-4".into())).await.expect("read").expect("row");
        assert_eq!(terminal.sla_status, SlaStatus::OnTrack);
    }

    #[tokio::test]
    async fn second_cycle_with_same_now_is_a_no_op() {
        let now = ts("2026-03-02T12:00:00Z");
        let store = seeded(now).await;
        let reconciler = SlaReconciler::new(
            store,
            Arc::new(InMemoryNotificationSink::default()),
            SlaClock::standard(),
        );

        reconciler.run_cycle(now).await.expect("first cycle");
        let second = reconciler.run_cycle(now).await.expect("second cycle");

        assert_eq!(second.updated, 0);
        assert_eq!(second.notified, 0);
    }

    #[tokio::test]
    async fn per_request_failure_does_not_abort_the_cycle() {
        let now = ts("2026-03-02T12:00:00Z");
        let store = seeded(now).await;
        store.fail_writes_for(&RequestId("R-2".into())).await;
        let reconciler = SlaReconciler::new(
            store.clone(),
            Arc::new(InMemoryNotificationSink::default()),
            SlaClock::standard(),
        );

        let report = reconciler.run_cycle(now).await.expect("cycle");

        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 1);
        let breached = store.find_by_id(&RequestId("R-3".into())).await.expect("read").expect("row");
        assert_eq!(breached.sla_status, SlaStatus::Breached);
    }

    #[tokio::test]
    async fn notification_failure_still_counts_the_update() {
        let now = ts("2026-03-02T12:00:00Z");
        let store = seeded(now).await;
        let reconciler = SlaReconciler::new(
            store,
            Arc::new(InMemoryNotificationSink::failing()),
            SlaClock::standard(),
        );

        let report = reconciler.run_cycle(now).await.expect("cycle");

        assert_eq!(report.updated, 2);
        assert_eq!(report.notified, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn breached_requests_stay_breached_when_time_moves_backwards() {
        let now = ts("2026-03-02T12:00:00Z");
        let store = seeded(now).await;
        let reconciler = SlaReconciler::new(
            store.clone(),
            Arc::new(InMemoryNotificationSink::default()),
            SlaClock::standard(),
        );

        reconciler.run_cycle(now).await.expect("first cycle");
        reconciler.run_cycle(now - Duration::hours(6)).await.expect("earlier cycle");

        let breached = store.find_by_id(&RequestId("R-3".into())).await.expect("read").expect("row");
        assert_eq!(breached.sla_status, SlaStatus::Breached);
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let now = ts("2026-03-02T12:00:00Z");
        let reconciler = SlaReconciler::new(
            seeded(now).await,
            Arc::new(InMemoryNotificationSink::default()),
            SlaClock::standard(),
        );

        let _held = reconciler.cycle_guard.lock().await;
        let report = reconciler.run_cycle(now).await.expect("skipped cycle");

        assert!(report.skipped);
        assert_eq!(report.scanned, 0);
    }
}
