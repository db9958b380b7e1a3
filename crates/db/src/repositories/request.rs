use std::collections::BTreeMap;

use caseflow_core::domain::provider::ProviderId;
use caseflow_core::domain::request::{
    RequestDetails, RequestId, RequestNumber, RequestStatus, ServiceRequest, SlaStatus,
    SubscriberId, Urgency,
};
use caseflow_core::ports::{PortError, RequestRepository};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::{
    parse_optional_timestamp, parse_timestamp, terminal_status_list, timestamp, RepositoryError,
};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id,
    request_number,
    subscriber_id,
    assigned_provider_id,
    urgency,
    status,
    category,
    region,
    extra_attributes_json,
    details_json,
    submitted_at,
    sla_deadline,
    sla_status,
    completed_at,
    created_at,
    updated_at";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM service_request WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(request_from_row).transpose()
    }

    async fn insert_row(&self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        let details_json = encode_details(&request.details)?;
        let extra_json = serde_json::to_string(&request.extra_attributes)
            .map_err(|error| RepositoryError::Encode(format!("extra attributes: {error}")))?;

        sqlx::query(
            "INSERT INTO service_request (
                id,
                request_number,
                subscriber_id,
                request_type,
                assigned_provider_id,
                urgency,
                status,
                category,
                region,
                extra_attributes_json,
                details_json,
                submitted_at,
                sla_deadline,
                sla_status,
                completed_at,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.number.0)
        .bind(&request.subscriber_id.0)
        .bind(request.request_type().as_str())
        .bind(request.assigned_provider_id.as_ref().map(|provider| provider.0.as_str()))
        .bind(request.urgency.as_str())
        .bind(request.status.as_str())
        .bind(&request.category)
        .bind(request.region.as_deref())
        .bind(extra_json)
        .bind(details_json)
        .bind(timestamp(request.submitted_at))
        .bind(timestamp(request.sla_deadline))
        .bind(request.sla_status.as_str())
        .bind(request.completed_at.map(timestamp))
        .bind(timestamp(request.created_at))
        .bind(timestamp(request.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn active(&self) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS}
             FROM service_request
             WHERE status NOT IN {}
             ORDER BY id ASC",
            terminal_status_list()
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(request_from_row).collect()
    }

    async fn assign_pending(
        &self,
        id: &RequestId,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE service_request
             SET status = ?, assigned_provider_id = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(RequestStatus::Assigned.as_str())
        .bind(&provider_id.0)
        .bind(timestamp(now))
        .bind(&id.0)
        .bind(RequestStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_provider(
        &self,
        id: &RequestId,
        expected_status: RequestStatus,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE service_request
             SET assigned_provider_id = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(&provider_id.0)
        .bind(timestamp(now))
        .bind(&id.0)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_guarded(
        &self,
        request: &ServiceRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, RepositoryError> {
        let details_json = encode_details(&request.details)?;

        let result = sqlx::query(
            "UPDATE service_request
             SET assigned_provider_id = ?,
                 urgency = ?,
                 status = ?,
                 category = ?,
                 region = ?,
                 details_json = ?,
                 completed_at = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(request.assigned_provider_id.as_ref().map(|provider| provider.0.as_str()))
        .bind(request.urgency.as_str())
        .bind(request.status.as_str())
        .bind(&request.category)
        .bind(request.region.as_deref())
        .bind(details_json)
        .bind(request.completed_at.map(timestamp))
        .bind(timestamp(request.updated_at))
        .bind(&request.id.0)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn write_sla(
        &self,
        id: &RequestId,
        expected: SlaStatus,
        sla_status: SlaStatus,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE service_request
             SET sla_status = ?, sla_deadline = COALESCE(?, sla_deadline), updated_at = ?
             WHERE id = ? AND sla_status = ?",
        )
        .bind(sla_status.as_str())
        .bind(deadline.map(timestamp))
        .bind(timestamp(now))
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ServiceRequest>, PortError> {
        Ok(self.fetch(id).await?)
    }

    async fn insert(&self, request: ServiceRequest) -> Result<(), PortError> {
        Ok(self.insert_row(&request).await?)
    }

    async fn list_active(&self) -> Result<Vec<ServiceRequest>, PortError> {
        Ok(self.active().await?)
    }

    async fn assign_if_pending(
        &self,
        id: &RequestId,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        Ok(self.assign_pending(id, provider_id, now).await?)
    }

    async fn set_provider(
        &self,
        id: &RequestId,
        expected_status: RequestStatus,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        Ok(self.replace_provider(id, expected_status, provider_id, now).await?)
    }

    async fn save_if_status(
        &self,
        request: &ServiceRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, PortError> {
        Ok(self.save_guarded(request, expected_status).await?)
    }

    async fn update_sla(
        &self,
        id: &RequestId,
        expected: SlaStatus,
        sla_status: SlaStatus,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        Ok(self.write_sla(id, expected, sla_status, deadline, now).await?)
    }
}

fn encode_details(details: &RequestDetails) -> Result<String, RepositoryError> {
    serde_json::to_string(details)
        .map_err(|error| RepositoryError::Encode(format!("request details: {error}")))
}

fn request_from_row(row: SqliteRow) -> Result<ServiceRequest, RepositoryError> {
    let urgency_raw = row.try_get::<String, _>("urgency")?;
    let urgency = Urgency::parse(&urgency_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown urgency `{urgency_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;

    let sla_raw = row.try_get::<String, _>("sla_status")?;
    let sla_status = SlaStatus::parse(&sla_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown sla status `{sla_raw}`")))?;

    let extra_raw = row.try_get::<String, _>("extra_attributes_json")?;
    let extra_attributes =
        serde_json::from_str::<BTreeMap<String, String>>(&extra_raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid extra_attributes_json: {error}"))
        })?;

    let details_raw = row.try_get::<String, _>("details_json")?;
    let details = serde_json::from_str::<RequestDetails>(&details_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid details_json: {error}")))?;

    Ok(ServiceRequest {
        id: RequestId(row.try_get("id")?),
        number: RequestNumber(row.try_get("request_number")?),
        subscriber_id: SubscriberId(row.try_get("subscriber_id")?),
        assigned_provider_id: row
            .try_get::<Option<String>, _>("assigned_provider_id")?
            .map(ProviderId),
        urgency,
        status,
        category: row.try_get("category")?,
        region: row.try_get("region")?,
        extra_attributes,
        details,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        sla_deadline: parse_timestamp("sla_deadline", row.try_get("sla_deadline")?)?,
        sla_status,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use caseflow_core::domain::provider::ProviderId;
    use caseflow_core::domain::request::{
        CallDetails, RequestDetails, RequestId, RequestNumber, RequestStatus, ServiceRequest,
        SlaStatus, SubscriberId, Urgency,
    };
    use caseflow_core::ports::RequestRepository;
    use chrono::Duration;

    use super::SqlRequestRepository;
    use crate::repositories::test_support::{parse_ts, setup_pool};

    fn call_request(id: &str) -> ServiceRequest {
        let submitted = parse_ts("2026-03-01T08:00:00Z");
        ServiceRequest {
            id: RequestId(id.to_string()),
            number: RequestNumber(format!("CAL-20260301-{id}")),
            subscriber_id: SubscriberId("SUB-1".to_string()),
            assigned_provider_id: None,
            urgency: Urgency::High,
            status: RequestStatus::Pending,
            category: "tax".to_string(),
            region: Some("north".to_string()),
            extra_attributes: Default::default(),
            details: RequestDetails::Call(CallDetails {
                scheduled_at: None,
                duration_minutes: 30,
                call_link: None,
                reschedule_count: 0,
            }),
            submitted_at: submitted,
            sla_deadline: submitted + Duration::hours(4),
            sla_status: SlaStatus::OnTrack,
            completed_at: None,
            created_at: submitted,
            updated_at: submitted,
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip_preserves_details_and_extra_attributes() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let mut request = call_request("R-1");
        request.extra_attributes.insert("language".to_string(), "fr".to_string());

        repo.insert(request.clone()).await.expect("insert");

        let found = repo.find_by_id(&request.id).await.expect("find");
        assert_eq!(found, Some(request));
        assert_eq!(repo.find_by_id(&RequestId("R-404".into())).await.expect("find"), None);
        pool.close().await;
    }

    #[tokio::test]
    async fn assign_if_pending_wins_only_once() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = call_request("R-1");
        repo.insert(request.clone()).await.expect("insert");
        let now = parse_ts("2026-03-01T08:01:00Z");

        let first =
            repo.assign_if_pending(&request.id, &ProviderId("P-1".into()), now).await.expect("cas");
        let second =
            repo.assign_if_pending(&request.id, &ProviderId("P-2".into()), now).await.expect("cas");

        assert!(first);
        assert!(!second);
        let stored = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.status, RequestStatus::Assigned);
        assert_eq!(stored.assigned_provider_id, Some(ProviderId("P-1".into())));
        assert_eq!(stored.updated_at, now);
        pool.close().await;
    }

    #[tokio::test]
    async fn set_provider_and_save_respect_expected_status() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = call_request("R-1");
        repo.insert(request.clone()).await.expect("insert");
        let now = parse_ts("2026-03-01T09:00:00Z");
        repo.assign_if_pending(&request.id, &ProviderId("P-1".into()), now).await.expect("cas");

        let stale = repo
            .set_provider(&request.id, RequestStatus::Scheduled, &ProviderId("P-2".into()), now)
            .await
            .expect("write");
        let fresh = repo
            .set_provider(&request.id, RequestStatus::Assigned, &ProviderId("P-2".into()), now)
            .await
            .expect("write");
        assert!(!stale);
        assert!(fresh);

        let mut scheduled = repo.find_by_id(&request.id).await.expect("find").expect("present");
        scheduled.status = RequestStatus::Scheduled;
        if let RequestDetails::Call(call) = &mut scheduled.details {
            call.scheduled_at = Some(parse_ts("2026-03-02T10:00:00Z"));
            call.call_link = Some("https://meet.example/abc".to_string());
        }
        assert!(!repo.save_if_status(&scheduled, RequestStatus::Pending).await.expect("save"));
        assert!(repo.save_if_status(&scheduled, RequestStatus::Assigned).await.expect("save"));

        let stored = repo.find_by_id(&request.id).await.expect("find");
        assert_eq!(stored, Some(scheduled));
        pool.close().await;
    }

    #[tokio::test]
    async fn status_save_from_a_stale_read_keeps_the_stored_breach() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = call_request("R-1");
        repo.insert(request.clone()).await.expect("insert");
        let now = parse_ts("2026-03-01T13:00:00Z");
        repo.assign_if_pending(&request.id, &ProviderId("P-1".into()), now).await.expect("cas");
        let stale = repo.find_by_id(&request.id).await.expect("find").expect("present");

        assert!(repo
            .update_sla(&request.id, SlaStatus::OnTrack, SlaStatus::Breached, None, now)
            .await
            .expect("breach"));
        let mut cancelled = stale.clone();
        cancelled.status = RequestStatus::Cancelled;
        assert!(repo.save_if_status(&cancelled, RequestStatus::Assigned).await.expect("save"));

        let stored = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.status, RequestStatus::Cancelled);
        assert_eq!(stored.sla_status, SlaStatus::Breached);
        assert_eq!(stored.sla_deadline, stale.sla_deadline);
        pool.close().await;
    }

    #[tokio::test]
    async fn update_sla_is_guarded_by_previous_status_and_keeps_deadline_when_absent() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = call_request("R-1");
        repo.insert(request.clone()).await.expect("insert");
        let now = parse_ts("2026-03-01T10:30:00Z");

        assert!(repo
            .update_sla(&request.id, SlaStatus::OnTrack, SlaStatus::AtRisk, None, now)
            .await
            .expect("update"));
        assert!(!repo
            .update_sla(&request.id, SlaStatus::OnTrack, SlaStatus::Breached, None, now)
            .await
            .expect("update"));

        let new_deadline = parse_ts("2026-03-02T08:00:00Z");
        assert!(repo
            .update_sla(&request.id, SlaStatus::AtRisk, SlaStatus::OnTrack, Some(new_deadline), now)
            .await
            .expect("update"));

        let stored = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.sla_status, SlaStatus::OnTrack);
        assert_eq!(stored.sla_deadline, new_deadline);
        pool.close().await;
    }

    #[tokio::test]
    async fn list_active_skips_terminal_requests() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let open = call_request("R-1");
        let mut cancelled = call_request("R-2");
        cancelled.status = RequestStatus::Cancelled;
        let mut disputed = call_request("R-3");
        disputed.status = RequestStatus::Disputed;
        disputed.assigned_provider_id = Some(ProviderId("P-1".into()));
        for request in [open, cancelled, disputed] {
            repo.insert(request).await.expect("insert");
        }

        let active: Vec<String> =
            repo.list_active().await.expect("list").into_iter().map(|request| request.id.0).collect();
        assert_eq!(active, vec!["R-1".to_string(), "R-3".to_string()]);
        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_storage_error() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        repo.insert(call_request("R-1")).await.expect("insert");

        let error = repo.insert(call_request("R-1")).await.expect_err("duplicate");
        assert!(matches!(error, caseflow_core::ports::PortError::Storage(_)));
        pool.close().await;
    }
}
