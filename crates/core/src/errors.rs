use thiserror::Error;

use crate::lifecycle::TransitionError;
use crate::ports::PortError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("provider `{provider_id}` cannot take assignments: {reason}")]
    InvalidProvider { provider_id: String, reason: String },
    #[error("request `{request_id}` changed concurrently and could not be resolved")]
    ConcurrencyConflict { request_id: String },
    /// The reassignment is committed and recorded; only the SLA reset failed.
    #[error("request `{request_id}` moved to provider `{provider_id}` but its SLA was not reset: {message}")]
    SlaResetFailed { request_id: String, provider_id: String, message: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::Validation(message.into()))
    }

    /// Stable machine-readable class used in logs and CLI payloads.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Transition(_)) => "invalid_transition",
            Self::Domain(DomainError::Validation(_)) => "validation",
            Self::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            Self::NotFound { .. } => "not_found",
            Self::InvalidProvider { .. } => "invalid_provider",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::SlaResetFailed { .. } => "sla_reset_failed",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<TransitionError> for ApplicationError {
    fn from(value: TransitionError) -> Self {
        Self::Domain(DomainError::Transition(value))
    }
}

impl From<PortError> for ApplicationError {
    fn from(value: PortError) -> Self {
        match value {
            PortError::Storage(message) | PortError::Decode(message) => Self::Persistence(message),
            PortError::Unavailable(message) => Self::Integration(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The referenced record does not exist.",
            Self::Conflict { .. } => {
                "The record was changed by another operation. Reload it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::InvalidProvider { .. } => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            error @ (ApplicationError::ConcurrencyConflict { .. }
            | ApplicationError::SlaResetFailed { .. }) => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
