use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::{RequestId, ServiceRequest, SlaStatus};
use crate::errors::{ApplicationError, DomainError};
use crate::lifecycle::operations::LifecycleOperation;
use crate::ports::RequestRepository;

/// Loads a request, applies a pure lifecycle operation, and persists the next
/// snapshot under a status precondition. SLA changes made by an operation go
/// through the SLA-guarded write so a concurrent breach is never undone.
pub struct LifecycleService {
    requests: Arc<dyn RequestRepository>,
    audit: Arc<dyn AuditSink>,
}

impl LifecycleService {
    pub fn new(requests: Arc<dyn RequestRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { requests, audit }
    }

    pub async fn apply(
        &self,
        request_id: &RequestId,
        operation: LifecycleOperation,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, ApplicationError> {
        let current = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("request", request_id.0.clone()))?;

        let next = operation.apply(&current, now).map_err(DomainError::from)?;
        next.check_assignment_invariant()?;

        if !self.requests.save_if_status(&next, current.status).await? {
            warn!(
                event_name = "lifecycle.operation.conflict",
                request_id = %request_id.0,
                operation = operation.name(),
                expected_status = current.status.as_str(),
                "request status changed before the lifecycle write"
            );
            return Err(ApplicationError::ConcurrencyConflict { request_id: request_id.0.clone() });
        }
        if next.sla_status != current.sla_status {
            self.freeze_sla(request_id, current.sla_status, next.sla_status, now).await?;
        }

        info!(
            event_name = "lifecycle.operation.applied",
            request_id = %request_id.0,
            operation = operation.name(),
            from = current.status.as_str(),
            to = next.status.as_str(),
            "lifecycle operation applied"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                request_id.0.clone(),
                format!("lifecycle.{}", operation.name()),
                AuditCategory::Lifecycle,
                "lifecycle-service",
                AuditOutcome::Success,
            )
            .with_metadata("from", current.status.as_str())
            .with_metadata("to", next.status.as_str())
            .at(now),
        );

        Ok(self.requests.find_by_id(request_id).await?.unwrap_or(next))
    }

    /// Writes the completion-time SLA classification unless the stored
    /// request is already breached.
    async fn freeze_sla(
        &self,
        request_id: &RequestId,
        mut expected: SlaStatus,
        frozen: SlaStatus,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        for _ in 0..2 {
            if expected == SlaStatus::Breached {
                return Ok(());
            }
            if self.requests.update_sla(request_id, expected, frozen, None, now).await? {
                return Ok(());
            }
            match self.requests.find_by_id(request_id).await? {
                Some(stored) => expected = stored.sla_status,
                None => return Ok(()),
            }
        }

        warn!(
            event_name = "lifecycle.sla_freeze.skipped",
            request_id = %request_id.0,
            frozen = frozen.as_str(),
            "SLA status kept changing; completion classification not written"
        );
        Ok(())
    }
}
