pub mod assignment;
pub mod audit;
pub mod best_effort;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intake;
pub mod lifecycle;
pub mod notify;
pub mod ports;
pub mod routing;
pub mod sla;

pub use assignment::{AssignmentDeps, AssignmentEngine, ReassignOptions};
pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NoopAuditSink,
    TracingAuditSink,
};
pub use best_effort::BestEffort;
pub use domain::assignment::{
    AssignmentFailureReason, AssignmentKind, AssignmentRecord, AssignmentResult, RoutingStats,
};
pub use domain::provider::{
    OrganizationId, ProviderCandidate, ProviderId, ProviderInfo, ProviderProfile,
    ProviderValidation, ProviderWorkload,
};
pub use domain::request::{
    RequestAttributes, RequestDetails, RequestId, RequestNumber, RequestStatus, RequestType,
    ServiceRequest, SlaStatus, SubscriberId, Urgency,
};
pub use domain::routing::{
    ConditionValue, RoutingRule, RuleConditions, RuleDraft, RuleId, TargetCriteria, TargetStrategy,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use intake::{NewRequest, RequestIntake, SubmittedRequest};
pub use lifecycle::{LifecycleOperation, LifecycleService, TransitionError};
pub use notify::{NotificationEvent, TracingNotificationSink};
pub use ports::PortError;
pub use routing::{ProviderCandidatePool, RoutingRuleCatalog, RuleTestReport};
pub use sla::{SlaClock, SlaCycleReport, SlaReconciler};
