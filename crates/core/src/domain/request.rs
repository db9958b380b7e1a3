use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::provider::ProviderId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestNumber(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Consultation,
    LegalOpinion,
    Litigation,
    Call,
    Service,
}

impl RequestType {
    pub const ALL: [RequestType; 5] =
        [Self::Consultation, Self::LegalOpinion, Self::Litigation, Self::Call, Self::Service];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consultation => "consultation",
            Self::LegalOpinion => "legal_opinion",
            Self::Litigation => "litigation",
            Self::Call => "call",
            Self::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "consultation" => Some(Self::Consultation),
            "legal_opinion" => Some(Self::LegalOpinion),
            "litigation" => Some(Self::Litigation),
            "call" => Some(Self::Call),
            "service" => Some(Self::Service),
            _ => None,
        }
    }

    /// Prefix used in human-readable request numbers.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            Self::Consultation => "CON",
            Self::LegalOpinion => "LOP",
            Self::Litigation => "LIT",
            Self::Call => "CAL",
            Self::Service => "SRV",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Urgent,
}

impl Urgency {
    pub const ALL: [Urgency; 4] = [Self::Low, Self::Normal, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Assigned,
    Scheduled,
    InProgress,
    QuoteSent,
    Completed,
    Cancelled,
    Disputed,
    Closed,
    NoShow,
    Rescheduled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 11] = [
        Self::Pending,
        Self::Assigned,
        Self::Scheduled,
        Self::InProgress,
        Self::QuoteSent,
        Self::Completed,
        Self::Cancelled,
        Self::Disputed,
        Self::Closed,
        Self::NoShow,
        Self::Rescheduled,
    ];

    /// Statuses in which a provider must be attached to the request.
    pub const PROVIDER_HELD: [RequestStatus; 5] =
        [Self::Assigned, Self::InProgress, Self::QuoteSent, Self::Scheduled, Self::Rescheduled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::QuoteSent => "quote_sent",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Disputed => "disputed",
            Self::Closed => "closed",
            Self::NoShow => "no_show",
            Self::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "scheduled" => Some(Self::Scheduled),
            "in_progress" => Some(Self::InProgress),
            "quote_sent" => Some(Self::QuoteSent),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "disputed" => Some(Self::Disputed),
            "closed" => Some(Self::Closed),
            "no_show" => Some(Self::NoShow),
            "rescheduled" => Some(Self::Rescheduled),
            _ => None,
        }
    }

    pub fn holds_provider(&self) -> bool {
        Self::PROVIDER_HELD.contains(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    OnTrack,
    AtRisk,
    Breached,
}

impl SlaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "on_track",
            Self::AtRisk => "at_risk",
            Self::Breached => "breached",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on_track" => Some(Self::OnTrack),
            "at_risk" => Some(Self::AtRisk),
            "breached" => Some(Self::Breached),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationDetails {
    pub subject: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalOpinionDetails {
    pub subject: String,
    pub jurisdiction: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LitigationDetails {
    pub case_type: String,
    pub court: Option<String>,
    pub opposing_party: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDetails {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub call_link: Option<String>,
    pub reschedule_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDetails {
    pub service_kind: String,
    pub description: String,
}

/// Variant payload of a request. The request type is always derived from the
/// variant, never stored separately on the snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestDetails {
    Consultation(ConsultationDetails),
    LegalOpinion(LegalOpinionDetails),
    Litigation(LitigationDetails),
    Call(CallDetails),
    Service(ServiceDetails),
}

impl RequestDetails {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Consultation(_) => RequestType::Consultation,
            Self::LegalOpinion(_) => RequestType::LegalOpinion,
            Self::Litigation(_) => RequestType::Litigation,
            Self::Call(_) => RequestType::Call,
            Self::Service(_) => RequestType::Service,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub number: RequestNumber,
    pub subscriber_id: SubscriberId,
    pub assigned_provider_id: Option<ProviderId>,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub category: String,
    pub region: Option<String>,
    /// Routing attributes given at submission beyond the built-in ones.
    #[serde(default)]
    pub extra_attributes: BTreeMap<String, String>,
    pub details: RequestDetails,
    pub submitted_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    pub sla_status: SlaStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn request_type(&self) -> RequestType {
        self.details.request_type()
    }

    pub fn attributes(&self) -> RequestAttributes {
        RequestAttributes {
            request_type: self.request_type(),
            category: self.category.clone(),
            urgency: self.urgency,
            region: self.region.clone(),
            extra: self.extra_attributes.clone(),
        }
    }

    pub fn check_assignment_invariant(&self) -> Result<(), DomainError> {
        match (self.status, &self.assigned_provider_id) {
            (status, None) if status.holds_provider() => {
                Err(DomainError::InvariantViolation(format!(
                    "request `{}` in status `{}` has no assigned provider",
                    self.id.0,
                    status.as_str()
                )))
            }
            (RequestStatus::Pending, Some(provider)) => {
                Err(DomainError::InvariantViolation(format!(
                    "pending request `{}` already carries provider `{}`",
                    self.id.0, provider.0
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn call_details(&self) -> Option<&CallDetails> {
        match &self.details {
            RequestDetails::Call(details) => Some(details),
            _ => None,
        }
    }
}

/// Attribute view of a request used for rule matching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAttributes {
    pub request_type: RequestType,
    pub category: String,
    pub urgency: Urgency,
    pub region: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl RequestAttributes {
    pub fn new(request_type: RequestType, category: impl Into<String>, urgency: Urgency) -> Self {
        Self {
            request_type,
            category: category.into(),
            urgency,
            region: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        match key.trim().to_ascii_lowercase().as_str() {
            "category" => Some(Cow::Borrowed(self.category.as_str())),
            "request_type" | "type" => Some(Cow::Borrowed(self.request_type.as_str())),
            "urgency" => Some(Cow::Borrowed(self.urgency.as_str())),
            "region" => self.region.as_deref().map(Cow::Borrowed),
            other => self
                .extra
                .iter()
                .find(|(extra_key, _)| extra_key.trim().eq_ignore_ascii_case(other))
                .map(|(_, value)| Cow::Borrowed(value.as_str())),
        }
    }
}
