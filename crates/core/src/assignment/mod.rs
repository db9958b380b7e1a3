//! Rule-based auto-assignment plus the administrative override.
//!
//! The only cross-caller coordination is the conditional write
//! [`RequestRepository::assign_if_pending`]. Everything before it is read-only,
//! so any number of `auto_assign` calls may run in parallel, and a caller
//! timeout can abandon that part without leaving partial state.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::best_effort::BestEffort;
use crate::domain::assignment::{
    AssignmentFailureReason, AssignmentKind, AssignmentRecord, AssignmentResult, RoutingStats,
};
use crate::domain::provider::{ProviderId, ProviderWorkload};
use crate::domain::request::{RequestAttributes, RequestId, RequestStatus, ServiceRequest};
use crate::domain::routing::RuleId;
use crate::errors::ApplicationError;
use crate::lifecycle::{is_terminal, transition};
use crate::notify::NotificationEvent;
use crate::ports::{
    AssignmentLog, NotificationSink, ProviderDataSource, ProviderValidator, RequestRepository,
};
use crate::routing::{rank, ProviderCandidatePool, RoutingRuleCatalog};
use crate::sla::SlaClock;

pub const DEFAULT_ASSIGNMENT_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Collaborators injected into [`AssignmentEngine`].
pub struct AssignmentDeps {
    pub requests: Arc<dyn RequestRepository>,
    pub catalog: Arc<RoutingRuleCatalog>,
    pub providers: Arc<dyn ProviderDataSource>,
    pub validator: Arc<dyn ProviderValidator>,
    pub notifications: Arc<dyn NotificationSink>,
    pub log: Arc<dyn AssignmentLog>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: SlaClock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReassignOptions {
    /// Recompute the SLA deadline from `now` instead of keeping the stored one.
    pub recompute_deadline: bool,
    pub now: DateTime<Utc>,
}

impl ReassignOptions {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { recompute_deadline: false, now }
    }

    pub fn recompute_deadline(mut self) -> Self {
        self.recompute_deadline = true;
        self
    }
}

pub struct AssignmentEngine {
    requests: Arc<dyn RequestRepository>,
    catalog: Arc<RoutingRuleCatalog>,
    pool: ProviderCandidatePool,
    providers: Arc<dyn ProviderDataSource>,
    validator: Arc<dyn ProviderValidator>,
    notifications: Arc<dyn NotificationSink>,
    log: Arc<dyn AssignmentLog>,
    audit: Arc<dyn AuditSink>,
    clock: SlaClock,
    timeout: StdDuration,
}

impl AssignmentEngine {
    pub fn new(deps: AssignmentDeps) -> Self {
        Self {
            pool: ProviderCandidatePool::new(deps.providers.clone()),
            requests: deps.requests,
            catalog: deps.catalog,
            providers: deps.providers,
            validator: deps.validator,
            notifications: deps.notifications,
            log: deps.log,
            audit: deps.audit,
            clock: deps.clock,
            timeout: DEFAULT_ASSIGNMENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Assigns a pending request through the first applicable rule. Safe to
    /// retry and to call concurrently: later callers observe the existing
    /// assignment instead of writing a second one.
    pub async fn auto_assign(
        &self,
        request_id: &RequestId,
        attributes: &RequestAttributes,
    ) -> Result<AssignmentResult, ApplicationError> {
        let now = Utc::now();
        let selection = self.select(request_id, attributes, now).await?;
        self.commit(request_id, selection, now).await
    }

    /// [`Self::auto_assign`] with every error folded into a failed result.
    /// Never returns an error.
    ///
    /// The timeout bounds only the read-only selection. Once a provider is
    /// chosen, the conditional write, notification and history append run to
    /// completion, so a timed-out result always means the request is still
    /// pending.
    pub async fn auto_assign_best_effort(
        &self,
        request_id: &RequestId,
        attributes: &RequestAttributes,
    ) -> AssignmentResult {
        let now = Utc::now();
        let outcome =
            match tokio::time::timeout(self.timeout, self.select(request_id, attributes, now)).await
            {
                Ok(Ok(selection)) => self.commit(request_id, selection, now).await,
                Ok(Err(error)) => Err(error),
                Err(_) => {
                    warn!(
                        event_name = "routing.auto_assign.timeout",
                        request_id = %request_id.0,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "auto-assignment timed out"
                    );
                    let result = AssignmentResult::failed(
                        request_id.clone(),
                        AssignmentFailureReason::Timeout,
                        None,
                        Utc::now(),
                    );
                    return self
                        .finish(
                            result,
                            AssignmentKind::Auto,
                            Some("assignment attempt timed out".to_string()),
                        )
                        .await;
                }
            };

        let error = match outcome {
            Ok(result) => return result,
            Err(error) => error,
        };
        warn!(
            event_name = "routing.auto_assign.failed",
            request_id = %request_id.0,
            error_class = error.error_class(),
            error = %error,
            "auto-assignment failed; request stays pending"
        );
        let reason = match error {
            ApplicationError::ConcurrencyConflict { .. } => {
                AssignmentFailureReason::ConcurrencyConflict
            }
            _ => AssignmentFailureReason::Error,
        };
        let result = AssignmentResult::failed(request_id.clone(), reason, None, Utc::now());
        self.finish(result, AssignmentKind::Auto, Some(error.to_string())).await
    }

    /// Administrative override. Errors propagate to the caller.
    ///
    /// The provider change is recorded, audited and announced as soon as it
    /// commits. A later SLA reset failure comes back as
    /// [`ApplicationError::SlaResetFailed`]; repeating the call with the same
    /// provider retries the reset.
    pub async fn reassign(
        &self,
        request_id: &RequestId,
        provider_id: &ProviderId,
        reason: &str,
        options: ReassignOptions,
    ) -> Result<AssignmentResult, ApplicationError> {
        let now = options.now;
        let validation = self.validator.validate(provider_id).await?;
        if !validation.valid {
            return Err(ApplicationError::InvalidProvider {
                provider_id: provider_id.0.clone(),
                reason: validation.reason.unwrap_or_else(|| "provider rejected".to_string()),
            });
        }

        let request = self.load(request_id).await?;
        if is_terminal(request.status) {
            transition(request.request_type(), request.status, RequestStatus::Assigned)?;
        }

        let written = if request.status == RequestStatus::Pending {
            transition(request.request_type(), request.status, RequestStatus::Assigned)?;
            self.requests.assign_if_pending(request_id, provider_id, now).await?
        } else {
            self.requests.set_provider(request_id, request.status, provider_id, now).await?
        };
        if !written {
            return Err(ApplicationError::ConcurrencyConflict { request_id: request_id.0.clone() });
        }

        let result = AssignmentResult::assigned(request_id.clone(), provider_id.clone(), None, now);
        self.notify(NotificationEvent::RequestReassigned {
            request_id: request_id.clone(),
            previous_provider_id: request.assigned_provider_id.clone(),
            provider_id: provider_id.clone(),
            reason: reason.to_string(),
            occurred_at: now,
        })
        .await;
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                request_id.0.clone(),
                "assignment.reassigned",
                AuditCategory::Assignment,
                "assignment-engine",
                AuditOutcome::Success,
            )
            .with_metadata("provider_id", provider_id.0.clone())
            .with_metadata(
                "previous_provider_id",
                request.assigned_provider_id.as_ref().map(|id| id.0.clone()).unwrap_or_default(),
            )
            .with_metadata("reason", reason)
            .at(now),
        );

        let result = self.finish(result, AssignmentKind::Manual, Some(reason.to_string())).await;

        // The provider change above is already committed and recorded.
        if let Err(error) = self.reset_sla(&request, options).await {
            warn!(
                event_name = "routing.reassign.sla_reset_failed",
                request_id = %request_id.0,
                provider_id = %provider_id.0,
                error_class = error.error_class(),
                error = %error,
                "request reassigned but its SLA was not reset"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(request_id.clone()),
                    request_id.0.clone(),
                    "assignment.sla_reset_failed",
                    AuditCategory::Assignment,
                    "assignment-engine",
                    AuditOutcome::Failed,
                )
                .with_metadata("provider_id", provider_id.0.clone())
                .with_metadata("error_class", error.error_class())
                .at(now),
            );
            return Err(ApplicationError::SlaResetFailed {
                request_id: request_id.0.clone(),
                provider_id: provider_id.0.clone(),
                message: error.to_string(),
            });
        }

        Ok(result)
    }

    pub async fn get_provider_workload(
        &self,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<ProviderWorkload, ApplicationError> {
        let active_request_count = self.providers.active_request_count(provider_id).await?;
        let completed_today_count =
            self.providers.completed_today_count(provider_id, day_start(now)).await?;

        Ok(ProviderWorkload {
            provider_id: provider_id.clone(),
            active_request_count,
            completed_today_count,
        })
    }

    pub async fn get_routing_stats(&self) -> Result<RoutingStats, ApplicationError> {
        let records = self.log.list().await?;
        Ok(RoutingStats::from_records(&records))
    }

    async fn load(&self, request_id: &RequestId) -> Result<ServiceRequest, ApplicationError> {
        self.requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("request", request_id.0.clone()))
    }

    /// Read-only half of auto-assignment: rule lookup and candidate ranking.
    async fn select(
        &self,
        request_id: &RequestId,
        attributes: &RequestAttributes,
        now: DateTime<Utc>,
    ) -> Result<Selection, ApplicationError> {
        let request = self.load(request_id).await?;
        if let Some(existing) = existing_assignment(&request, now) {
            return Ok(Selection::Existing(existing));
        }
        transition(request.request_type(), request.status, RequestStatus::Assigned)?;

        let Some(rule) = self.catalog.find_applicable_rule(attributes).await? else {
            return Ok(Selection::Unassignable {
                reason: AssignmentFailureReason::NoRuleMatched,
                rule_id: None,
            });
        };

        let candidates = self.pool.available_candidates(&rule.target, day_start(now)).await?;
        Ok(match rank(candidates).into_iter().next() {
            Some(winner) => Selection::Chosen { rule_id: rule.id, provider_id: winner.provider_id },
            None => Selection::Unassignable {
                reason: AssignmentFailureReason::NoProviderAvailable,
                rule_id: Some(rule.id),
            },
        })
    }

    async fn commit(
        &self,
        request_id: &RequestId,
        selection: Selection,
        now: DateTime<Utc>,
    ) -> Result<AssignmentResult, ApplicationError> {
        let (rule_id, provider_id) = match selection {
            Selection::Existing(existing) => return Ok(existing),
            Selection::Unassignable { reason, rule_id } => {
                let result = AssignmentResult::failed(request_id.clone(), reason, rule_id, now);
                return Ok(self.finish(result, AssignmentKind::Auto, None).await);
            }
            Selection::Chosen { rule_id, provider_id } => (rule_id, provider_id),
        };

        if self.requests.assign_if_pending(request_id, &provider_id, now).await? {
            let result = AssignmentResult::assigned(
                request_id.clone(),
                provider_id.clone(),
                Some(rule_id),
                now,
            );
            self.notify(NotificationEvent::RequestAssigned {
                request_id: request_id.clone(),
                provider_id,
                occurred_at: now,
            })
            .await;
            return Ok(self.finish(result, AssignmentKind::Auto, None).await);
        }

        // Lost the race: re-read once and report whoever won.
        let current = self.load(request_id).await?;
        match existing_assignment(&current, now) {
            Some(existing) => {
                info!(
                    event_name = "routing.auto_assign.already_assigned",
                    request_id = %request_id.0,
                    "request was assigned by a concurrent caller"
                );
                Ok(existing)
            }
            None => Err(ApplicationError::ConcurrencyConflict { request_id: request_id.0.clone() }),
        }
    }

    /// Clears any breach freeze. The classification is recomputed from
    /// scratch, so it may move back from `breached`.
    async fn reset_sla(
        &self,
        request: &ServiceRequest,
        options: ReassignOptions,
    ) -> Result<(), ApplicationError> {
        let deadline = if options.recompute_deadline {
            self.clock.compute_deadline(request.request_type(), request.urgency, options.now)
        } else {
            request.sla_deadline
        };
        let status = self.clock.classify(options.now, deadline);
        let new_deadline = options.recompute_deadline.then_some(deadline);

        let mut expected = request.sla_status;
        for _ in 0..2 {
            if self
                .requests
                .update_sla(&request.id, expected, status, new_deadline, options.now)
                .await?
            {
                return Ok(());
            }
            // The reconciler moved the SLA status in between; retry once.
            expected = self.load(&request.id).await?.sla_status;
        }

        Err(ApplicationError::ConcurrencyConflict { request_id: request.id.0.clone() })
    }

    async fn notify(&self, event: NotificationEvent) {
        BestEffort::run("routing.notify", self.notifications.notify(&event)).await;
    }

    /// Appends the outcome to the assignment history (best-effort) and logs it.
    async fn finish(
        &self,
        result: AssignmentResult,
        kind: AssignmentKind,
        note: Option<String>,
    ) -> AssignmentResult {
        let record = AssignmentRecord::from_result(&result, kind, note);
        BestEffort::run("routing.assignment_log", self.log.append(record)).await;

        if result.success {
            info!(
                event_name = "routing.auto_assign.completed",
                request_id = %result.request_id.0,
                kind = kind.as_str(),
                provider_id = result.provider_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
                rule_id = result.rule_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
                "request assigned"
            );
        } else {
            warn!(
                event_name = "routing.auto_assign.unassigned",
                request_id = %result.request_id.0,
                reason = result.reason.map(|reason| reason.as_str()).unwrap_or("unknown"),
                "request left unassigned"
            );
        }
        result
    }
}

enum Selection {
    Existing(AssignmentResult),
    Unassignable { reason: AssignmentFailureReason, rule_id: Option<RuleId> },
    Chosen { rule_id: RuleId, provider_id: ProviderId },
}

fn existing_assignment(request: &ServiceRequest, now: DateTime<Utc>) -> Option<AssignmentResult> {
    if request.status == RequestStatus::Pending {
        return None;
    }
    request
        .assigned_provider_id
        .clone()
        .map(|provider_id| AssignmentResult::existing(request.id.clone(), provider_id, now))
}

pub(crate) fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}
