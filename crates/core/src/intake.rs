use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::assignment::AssignmentEngine;
use crate::domain::assignment::AssignmentResult;
use crate::domain::request::{
    RequestAttributes, RequestDetails, RequestId, RequestNumber, RequestStatus, RequestType,
    ServiceRequest, SlaStatus, SubscriberId, Urgency,
};
use crate::errors::ApplicationError;
use crate::ports::RequestRepository;
use crate::sla::SlaClock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub subscriber_id: SubscriberId,
    pub urgency: Urgency,
    pub category: String,
    pub region: Option<String>,
    pub details: RequestDetails,
    /// Extra routing attributes, stored on the request so later assignment
    /// retries see them too.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedRequest {
    pub request: ServiceRequest,
    pub assignment: AssignmentResult,
}

/// Creates requests and hands them to auto-assignment. Assignment problems
/// never fail the submission.
pub struct RequestIntake {
    requests: Arc<dyn RequestRepository>,
    engine: Arc<AssignmentEngine>,
    clock: SlaClock,
}

impl RequestIntake {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        engine: Arc<AssignmentEngine>,
        clock: SlaClock,
    ) -> Self {
        Self { requests, engine, clock }
    }

    pub async fn submit(
        &self,
        new_request: NewRequest,
        now: DateTime<Utc>,
    ) -> Result<SubmittedRequest, ApplicationError> {
        validate(&new_request)?;

        let request_type = new_request.details.request_type();
        let mut attributes = RequestAttributes::new(
            request_type,
            new_request.category.trim(),
            new_request.urgency,
        );
        if let Some(region) = &new_request.region {
            attributes = attributes.with_region(region.trim());
        }
        attributes.extra = new_request.attributes;

        let id = Uuid::new_v4();
        let request = ServiceRequest {
            id: RequestId(id.to_string()),
            number: request_number(request_type, id, now),
            subscriber_id: new_request.subscriber_id,
            assigned_provider_id: None,
            urgency: new_request.urgency,
            status: RequestStatus::Pending,
            category: attributes.category.clone(),
            region: attributes.region.clone(),
            extra_attributes: attributes.extra.clone(),
            details: new_request.details,
            submitted_at: now,
            sla_deadline: self.clock.compute_deadline(request_type, new_request.urgency, now),
            sla_status: SlaStatus::OnTrack,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.requests.insert(request.clone()).await?;
        info!(
            event_name = "intake.request.created",
            request_id = %request.id.0,
            request_number = %request.number.0,
            request_type = request_type.as_str(),
            "request created"
        );

        let assignment = self.engine.auto_assign_best_effort(&request.id, &attributes).await;
        let request = match self.requests.find_by_id(&request.id).await {
            Ok(Some(current)) => current,
            _ => request,
        };

        Ok(SubmittedRequest { request, assignment })
    }
}

/// `PREFIX-YYYYMMDD-XXXXXXXX`, the suffix taken from the request id.
pub fn request_number(request_type: RequestType, id: Uuid, now: DateTime<Utc>) -> RequestNumber {
    let suffix: String = id.simple().to_string().chars().take(8).collect();
    RequestNumber(format!(
        "{}-{}-{}",
        request_type.number_prefix(),
        now.format("%Y%m%d"),
        suffix.to_ascii_uppercase()
    ))
}

fn validate(new_request: &NewRequest) -> Result<(), ApplicationError> {
    if new_request.subscriber_id.0.trim().is_empty() {
        return Err(ApplicationError::validation("subscriber id must not be blank"));
    }
    if new_request.category.trim().is_empty() {
        return Err(ApplicationError::validation("request category must not be blank"));
    }
    if let RequestDetails::Call(call) = &new_request.details {
        if call.duration_minutes == 0 {
            return Err(ApplicationError::validation("call duration must be greater than zero"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use super::{request_number, NewRequest, RequestIntake};
    use crate::assignment::{AssignmentDeps, AssignmentEngine};
    use crate::audit::InMemoryAuditSink;
    use crate::domain::assignment::AssignmentFailureReason;
    use crate::domain::provider::{OrganizationId, ProviderId, ProviderProfile};
    use crate::domain::request::{
        CallDetails, RequestDetails, RequestStatus, RequestType, ServiceDetails, SubscriberId,
        Urgency,
    };
    use crate::domain::routing::{RuleConditions, RuleDraft, TargetCriteria, TargetStrategy};
    use crate::notify::InMemoryNotificationSink;
    use crate::ports::{
        InMemoryAssignmentLog, InMemoryProviderDirectory, InMemoryRequestStore, InMemoryRuleStore,
        RequestRepository,
    };
    use crate::routing::RoutingRuleCatalog;
    use crate::sla::SlaClock;

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    async fn intake() -> (RequestIntake, Arc<RoutingRuleCatalog>, Arc<InMemoryRequestStore>) {
        let requests = Arc::new(InMemoryRequestStore::default());
        let directory = Arc::new(InMemoryProviderDirectory::new(requests.clone()));
        directory
            .upsert(ProviderProfile {
                provider_id: ProviderId("P-1".to_string()),
                organization_id: OrganizationId("ORG-1".to_string()),
                display_name: "Notary One".to_string(),
                specializations: vec!["notary".to_string()],
                certified: true,
                experience_years: 9,
                rating: None,
                region: Some("north".to_string()),
                is_active: true,
                can_accept_requests: true,
                organization_approved: true,
            })
            .await;
        let catalog = Arc::new(RoutingRuleCatalog::new(
            Arc::new(InMemoryRuleStore::default()),
            Arc::new(InMemoryAuditSink::default()),
        ));
        let engine = Arc::new(AssignmentEngine::new(AssignmentDeps {
            requests: requests.clone(),
            catalog: catalog.clone(),
            providers: directory.clone(),
            validator: directory,
            notifications: Arc::new(InMemoryNotificationSink::default()),
            log: Arc::new(InMemoryAssignmentLog::default()),
            audit: Arc::new(InMemoryAuditSink::default()),
            clock: SlaClock::standard(),
        }));

        (RequestIntake::new(requests.clone(), engine, SlaClock::standard()), catalog, requests)
    }

    fn notary_request() -> NewRequest {
        NewRequest {
            subscriber_id: SubscriberId("SUB-1".to_string()),
            urgency: Urgency::Urgent,
            category: "notary".to_string(),
            region: Some("north".to_string()),
            details: RequestDetails::Service(ServiceDetails {
                service_kind: "notarisation".to_string(),
                description: "Certify a power of attorney".to_string(),
            }),
            attributes: BTreeMap::from([("language".to_string(), "fr".to_string())]),
        }
    }

    #[tokio::test]
    async fn submission_computes_deadline_and_auto_assigns() {
        let (intake, catalog, _) = intake().await;
        let now = ts("2026-03-01T08:00:00Z");
        catalog
            .create(
                RuleDraft {
                    name: "french notary".to_string(),
                    priority: 1,
                    active: true,
                    conditions: RuleConditions::default()
                        .equals("category", "notary")
                        .equals("language", "fr"),
                    target: TargetStrategy::Pool(TargetCriteria {
                        specializations: vec!["notary".to_string()],
                        ..TargetCriteria::default()
                    }),
                },
                now,
            )
            .await
            .expect("rule");

        let submitted = intake.submit(notary_request(), now).await.expect("submit");

        assert!(submitted.assignment.success);
        assert_eq!(submitted.request.status, RequestStatus::Assigned);
        assert_eq!(submitted.request.sla_deadline, now + Duration::hours(8));
        assert!(submitted.request.number.0.starts_with("SRV-20260301-"));
    }

    #[tokio::test]
    async fn assignment_failure_never_fails_submission() {
        let (intake, _, requests) = intake().await;
        let now = ts("2026-03-01T08:00:00Z");

        let submitted = intake.submit(notary_request(), now).await.expect("submit");

        assert!(!submitted.assignment.success);
        assert_eq!(submitted.assignment.reason, Some(AssignmentFailureReason::NoRuleMatched));
        let stored = requests.find_by_id(&submitted.request.id).await.expect("read");
        assert_eq!(stored.map(|request| request.status), Some(RequestStatus::Pending));
    }

    #[tokio::test]
    async fn retry_after_submission_still_sees_extra_attributes() {
        let (intake, catalog, requests) = intake().await;
        let now = ts("2026-03-01T08:00:00Z");
        let submitted = intake.submit(notary_request(), now).await.expect("submit");
        assert!(!submitted.assignment.success);

        catalog
            .create(
                RuleDraft {
                    name: "french speakers".to_string(),
                    priority: 1,
                    active: true,
                    conditions: RuleConditions::default().equals("language", "fr"),
                    target: TargetStrategy::Pool(TargetCriteria::default()),
                },
                now,
            )
            .await
            .expect("rule");
        let stored = requests
            .find_by_id(&submitted.request.id)
            .await
            .expect("read")
            .expect("request exists");
        assert_eq!(stored.extra_attributes.get("language").map(String::as_str), Some("fr"));

        let retried =
            intake.engine.auto_assign(&stored.id, &stored.attributes()).await.expect("retry");

        assert!(retried.success);
        assert_eq!(retried.provider_id, Some(ProviderId("P-1".to_string())));
    }

    #[tokio::test]
    async fn invalid_submissions_are_rejected_before_insert() {
        let (intake, _, requests) = intake().await;
        let mut blank = notary_request();
        blank.category = "   ".to_string();
        let mut zero_call = notary_request();
        zero_call.details = RequestDetails::Call(CallDetails {
            scheduled_at: None,
            duration_minutes: 0,
            call_link: None,
            reschedule_count: 0,
        });

        for new_request in [blank, zero_call] {
            let error = intake.submit(new_request, Utc::now()).await.expect_err("invalid");
            assert_eq!(error.error_class(), "validation");
        }
        assert!(requests.snapshot().await.is_empty());
    }

    #[test]
    fn request_number_uses_type_prefix_date_and_id_suffix() {
        let id = Uuid::parse_str("1f0e2d3c-4b5a-4978-8a6b-5c4d3e2f1a0b").expect("uuid");
        let number = request_number(RequestType::LegalOpinion, id, ts("2026-11-05T23:59:00Z"));
        assert_eq!(number.0, "LOP-20261105-1F0E2D3C");
    }
}
