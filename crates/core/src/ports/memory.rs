//! In-memory adapters for every port. Conditional writes hold the store's
//! write lock for the check and the update, which makes them atomic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    AssignmentLog, PortError, ProviderDataSource, ProviderValidator, RequestRepository,
    RoutingRuleStore,
};
use crate::domain::assignment::AssignmentRecord;
use crate::domain::provider::{
    ProviderCandidate, ProviderId, ProviderProfile, ProviderValidation,
};
use crate::domain::request::{RequestId, RequestStatus, ServiceRequest, SlaStatus};
use crate::domain::routing::{RoutingRule, RuleId};
use crate::lifecycle::is_terminal;

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<String, ServiceRequest>>,
    failing_ids: RwLock<HashSet<String>>,
}

impl InMemoryRequestStore {
    /// Makes every write against `id` fail with a storage error.
    pub async fn fail_writes_for(&self, id: &RequestId) {
        self.failing_ids.write().await.insert(id.0.clone());
    }

    pub async fn snapshot(&self) -> Vec<ServiceRequest> {
        let mut requests: Vec<ServiceRequest> =
            self.requests.read().await.values().cloned().collect();
        requests.sort_by(|left, right| left.id.cmp(&right.id));
        requests
    }

    async fn check_writable(&self, id: &RequestId) -> Result<(), PortError> {
        if self.failing_ids.read().await.contains(&id.0) {
            return Err(PortError::Storage(format!("write rejected for request `{}`", id.0)));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestStore {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ServiceRequest>, PortError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn insert(&self, request: ServiceRequest) -> Result<(), PortError> {
        self.check_writable(&request.id).await?;
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(PortError::Storage(format!("request `{}` already exists", request.id.0)));
        }
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<ServiceRequest>, PortError> {
        let mut active: Vec<ServiceRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|request| !is_terminal(request.status))
            .cloned()
            .collect();
        active.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(active)
    }

    async fn assign_if_pending(
        &self,
        id: &RequestId,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        self.check_writable(id).await?;
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&id.0) else {
            return Ok(false);
        };
        if request.status != RequestStatus::Pending {
            return Ok(false);
        }

        request.status = RequestStatus::Assigned;
        request.assigned_provider_id = Some(provider_id.clone());
        request.updated_at = now;
        Ok(true)
    }

    async fn set_provider(
        &self,
        id: &RequestId,
        expected_status: RequestStatus,
        provider_id: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        self.check_writable(id).await?;
        let mut requests = self.requests.write().await;
        match requests.get_mut(&id.0) {
            Some(request) if request.status == expected_status => {
                request.assigned_provider_id = Some(provider_id.clone());
                request.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_if_status(
        &self,
        request: &ServiceRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, PortError> {
        self.check_writable(&request.id).await?;
        let mut requests = self.requests.write().await;
        match requests.get_mut(&request.id.0) {
            Some(stored) if stored.status == expected_status => {
                let (sla_status, sla_deadline) = (stored.sla_status, stored.sla_deadline);
                *stored = request.clone();
                stored.sla_status = sla_status;
                stored.sla_deadline = sla_deadline;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_sla(
        &self,
        id: &RequestId,
        expected: SlaStatus,
        sla_status: SlaStatus,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        self.check_writable(id).await?;
        let mut requests = self.requests.write().await;
        match requests.get_mut(&id.0) {
            Some(request) if request.sla_status == expected => {
                request.sla_status = sla_status;
                if let Some(deadline) = deadline {
                    request.sla_deadline = deadline;
                }
                request.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Provider profiles plus workload counts derived from a shared request store.
pub struct InMemoryProviderDirectory {
    profiles: RwLock<Vec<ProviderProfile>>,
    requests: Arc<InMemoryRequestStore>,
}

impl InMemoryProviderDirectory {
    pub fn new(requests: Arc<InMemoryRequestStore>) -> Self {
        Self { profiles: RwLock::new(Vec::new()), requests }
    }

    pub async fn upsert(&self, profile: ProviderProfile) {
        let mut profiles = self.profiles.write().await;
        match profiles.iter_mut().find(|existing| existing.provider_id == profile.provider_id) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
    }

    async fn counts(
        &self,
        provider_id: &ProviderId,
        day_start: Option<DateTime<Utc>>,
    ) -> (u32, u32) {
        let requests = self.requests.requests.read().await;
        let mut active = 0_u32;
        let mut completed_today = 0_u32;
        for request in requests.values() {
            if request.assigned_provider_id.as_ref() != Some(provider_id) {
                continue;
            }
            if !is_terminal(request.status) {
                active += 1;
            }
            if request.status == RequestStatus::Completed
                && day_start.is_some_and(|start| {
                    request.completed_at.is_some_and(|completed| completed >= start)
                })
            {
                completed_today += 1;
            }
        }
        (active, completed_today)
    }
}

#[async_trait]
impl ProviderDataSource for InMemoryProviderDirectory {
    async fn list_eligible_providers(
        &self,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<ProviderCandidate>, PortError> {
        let profiles = self.profiles.read().await.clone();
        let mut candidates = Vec::new();
        for profile in profiles {
            if !(profile.is_active && profile.can_accept_requests && profile.organization_approved)
            {
                continue;
            }
            let (active, completed_today) = self.counts(&profile.provider_id, Some(day_start)).await;
            candidates.push(profile.to_candidate(active, completed_today));
        }
        Ok(candidates)
    }

    async fn active_request_count(&self, provider_id: &ProviderId) -> Result<u32, PortError> {
        Ok(self.counts(provider_id, None).await.0)
    }

    async fn completed_today_count(
        &self,
        provider_id: &ProviderId,
        day_start: DateTime<Utc>,
    ) -> Result<u32, PortError> {
        Ok(self.counts(provider_id, Some(day_start)).await.1)
    }
}

#[async_trait]
impl ProviderValidator for InMemoryProviderDirectory {
    async fn validate(&self, provider_id: &ProviderId) -> Result<ProviderValidation, PortError> {
        let profiles = self.profiles.read().await;
        Ok(match profiles.iter().find(|profile| &profile.provider_id == provider_id) {
            Some(profile) => ProviderValidation::from_info(profile.info()),
            None => ProviderValidation::reject(format!("provider `{}` does not exist", provider_id.0)),
        })
    }
}

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<String, RoutingRule>>,
}

#[async_trait]
impl RoutingRuleStore for InMemoryRuleStore {
    async fn list(&self) -> Result<Vec<RoutingRule>, PortError> {
        let mut rules: Vec<RoutingRule> = self.rules.read().await.values().cloned().collect();
        rules.sort_by(|left, right| left.evaluation_order(right));
        Ok(rules)
    }

    async fn get(&self, id: &RuleId) -> Result<Option<RoutingRule>, PortError> {
        Ok(self.rules.read().await.get(&id.0).cloned())
    }

    async fn insert(&self, rule: RoutingRule) -> Result<(), PortError> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id.0) {
            return Err(PortError::Storage(format!("routing rule `{}` already exists", rule.id.0)));
        }
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn replace(&self, rule: RoutingRule) -> Result<bool, PortError> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(&rule.id.0) {
            Some(existing) => {
                *existing = rule;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &RuleId) -> Result<bool, PortError> {
        Ok(self.rules.write().await.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryAssignmentLog {
    records: RwLock<Vec<AssignmentRecord>>,
}

#[async_trait]
impl AssignmentLog for InMemoryAssignmentLog {
    async fn append(&self, record: AssignmentRecord) -> Result<(), PortError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AssignmentRecord>, PortError> {
        Ok(self.records.read().await.clone())
    }
}
