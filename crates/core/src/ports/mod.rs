//! Boundaries the routing core consumes. Every engine receives these as
//! constructor arguments; adapters live in [`memory`] and in `caseflow-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::assignment::AssignmentRecord;
use crate::domain::provider::{ProviderCandidate, ProviderId, ProviderValidation};
use crate::domain::request::{RequestId, RequestStatus, ServiceRequest, SlaStatus};
use crate::domain::routing::{RoutingRule, RuleId};
use crate::notify::NotificationEvent;

pub mod memory;

pub use memory::{
    InMemoryAssignmentLog, InMemoryProviderDirectory, InMemoryRequestStore, InMemoryRuleStore,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ServiceRequest>, PortError>;

    async fn insert(&self, request: ServiceRequest) -> Result<(), PortError>;

    /// Requests whose status is not terminal.
    async fn list_active(&self) -> Result<Vec<ServiceRequest>, PortError>;

    /// Sets the provider and moves `pending -> assigned` in one conditional
    /// write. Returns `false` when the request was no longer pending.
    async fn assign_if_pending(
        &self,
        id: &RequestId,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError>;

    /// Replaces the provider without a status change, guarded by `expected_status`.
    async fn set_provider(
        &self,
        id: &RequestId,
        expected_status: RequestStatus,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError>;

    /// Writes a snapshot if the stored status still equals `expected_status`.
    /// The SLA columns are left alone; they only move through [`Self::update_sla`].
    async fn save_if_status(
        &self,
        request: &ServiceRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, PortError>;

    /// Writes SLA fields if the stored SLA status still equals `expected`.
    /// `deadline` is left untouched when `None`.
    async fn update_sla(
        &self,
        id: &RequestId,
        expected: SlaStatus,
        sla_status: SlaStatus,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError>;
}

#[async_trait]
pub trait ProviderDataSource: Send + Sync {
    /// Active, accepting providers of approved organizations, with their
    /// workload counts computed at call time.
    async fn list_eligible_providers(
        &self,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<ProviderCandidate>, PortError>;

    async fn active_request_count(&self, provider_id: &ProviderId) -> Result<u32, PortError>;

    async fn completed_today_count(
        &self,
        provider_id: &ProviderId,
        day_start: DateTime<Utc>,
    ) -> Result<u32, PortError>;
}

#[async_trait]
pub trait ProviderValidator: Send + Sync {
    async fn validate(&self, provider_id: &ProviderId) -> Result<ProviderValidation, PortError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), PortError>;
}

#[async_trait]
pub trait RoutingRuleStore: Send + Sync {
    async fn list(&self) -> Result<Vec<RoutingRule>, PortError>;

    async fn get(&self, id: &RuleId) -> Result<Option<RoutingRule>, PortError>;

    async fn insert(&self, rule: RoutingRule) -> Result<(), PortError>;

    /// Returns `false` when no rule with that id exists.
    async fn replace(&self, rule: RoutingRule) -> Result<bool, PortError>;

    async fn remove(&self, id: &RuleId) -> Result<bool, PortError>;
}

#[async_trait]
pub trait AssignmentLog: Send + Sync {
    async fn append(&self, record: AssignmentRecord) -> Result<(), PortError>;

    async fn list(&self) -> Result<Vec<AssignmentRecord>, PortError>;
}
