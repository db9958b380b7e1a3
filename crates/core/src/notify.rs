use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::provider::ProviderId;
use crate::domain::request::{RequestId, SlaStatus};
use crate::ports::{NotificationSink, PortError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    RequestAssigned {
        request_id: RequestId,
        provider_id: ProviderId,
        occurred_at: DateTime<Utc>,
    },
    RequestReassigned {
        request_id: RequestId,
        previous_provider_id: Option<ProviderId>,
        provider_id: ProviderId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    SlaAtRisk {
        request_id: RequestId,
        provider_id: Option<ProviderId>,
        deadline: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    SlaBreached {
        request_id: RequestId,
        provider_id: Option<ProviderId>,
        deadline: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestAssigned { .. } => "request_assigned",
            Self::RequestReassigned { .. } => "request_reassigned",
            Self::SlaAtRisk { .. } => "sla_at_risk",
            Self::SlaBreached { .. } => "sla_breached",
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::RequestAssigned { request_id, .. }
            | Self::RequestReassigned { request_id, .. }
            | Self::SlaAtRisk { request_id, .. }
            | Self::SlaBreached { request_id, .. } => request_id,
        }
    }

    /// Event for a transition into `status`, if that transition is notable.
    pub fn for_sla_change(
        request_id: RequestId,
        provider_id: Option<ProviderId>,
        status: SlaStatus,
        deadline: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    ) -> Option<Self> {
        match status {
            SlaStatus::AtRisk => {
                Some(Self::SlaAtRisk { request_id, provider_id, deadline, occurred_at })
            }
            SlaStatus::Breached => {
                Some(Self::SlaBreached { request_id, provider_id, deadline, occurred_at })
            }
            SlaStatus::OnTrack => None,
        }
    }
}

/// Writes notifications to the log only. Default sink for the CLI, which
/// has no delivery transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), PortError> {
        info!(
            event_name = "notify.dispatched",
            kind = event.kind(),
            request_id = %event.request_id().0,
            "notification dispatched"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
    failing: bool,
}

impl InMemoryNotificationSink {
    /// Sink that rejects every event, for exercising best-effort paths.
    pub fn failing() -> Self {
        Self { events: Arc::default(), failing: true }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), PortError> {
        if self.failing {
            return Err(PortError::Unavailable("notification transport offline".to_string()));
        }
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}
