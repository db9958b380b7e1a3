use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::request::{RequestStatus, RequestType};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid {request_type:?} transition from {from:?} to {to:?}")]
    InvalidTransition { request_type: RequestType, from: RequestStatus, to: RequestStatus },
    #[error("cannot schedule at {requested_at} because it is not after {now}")]
    ScheduleInPast { requested_at: DateTime<Utc>, now: DateTime<Utc> },
    #[error("request has no scheduled time")]
    NotScheduled,
    #[error("cannot start before {earliest_start}")]
    TooEarlyToStart { earliest_start: DateTime<Utc> },
    #[error("cannot mark no-show before the scheduled time {scheduled_at}")]
    NoShowBeforeScheduledTime { scheduled_at: DateTime<Utc> },
    #[error("operation `{operation}` is not supported for {request_type:?} requests")]
    UnsupportedOperation { request_type: RequestType, operation: &'static str },
    #[error("request in status {status:?} can no longer be modified")]
    NotModifiable { status: RequestStatus },
}

pub fn is_terminal(status: RequestStatus) -> bool {
    matches!(status, RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Closed)
}

/// Whether fields other than the status may still change.
pub fn can_modify(status: RequestStatus) -> bool {
    !is_terminal(status) && status != RequestStatus::InProgress
}

/// Validates `current -> target` against the transition table owned by
/// `request_type`. Pure: no I/O and no time-dependent guards.
pub fn transition(
    request_type: RequestType,
    current: RequestStatus,
    target: RequestStatus,
) -> Result<(), TransitionError> {
    if !is_terminal(current) && table_allows(request_type, current, target) {
        return Ok(());
    }

    Err(TransitionError::InvalidTransition { request_type, from: current, to: target })
}

pub fn allowed_targets(request_type: RequestType, current: RequestStatus) -> Vec<RequestStatus> {
    RequestStatus::ALL
        .into_iter()
        .filter(|target| transition(request_type, current, *target).is_ok())
        .collect()
}

fn table_allows(request_type: RequestType, from: RequestStatus, to: RequestStatus) -> bool {
    match request_type {
        RequestType::Call => call_table(from, to),
        RequestType::Consultation | RequestType::LegalOpinion => advisory_table(from, to),
        RequestType::Litigation => litigation_table(from, to),
        RequestType::Service => service_table(from, to),
    }
}

fn call_table(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::{
        Assigned, Cancelled, Completed, InProgress, NoShow, Pending, Rescheduled, Scheduled,
    };

    matches!(
        (from, to),
        (Pending, Assigned)
            | (Assigned, Scheduled)
            | (Scheduled, InProgress)
            | (Rescheduled, InProgress)
            | (InProgress, Completed)
            | (Scheduled, Rescheduled)
            | (NoShow, Rescheduled)
            | (Rescheduled, Rescheduled)
            | (Pending, Cancelled)
            | (Assigned, Cancelled)
            | (Scheduled, Cancelled)
            | (Rescheduled, Cancelled)
            | (Scheduled, NoShow)
    )
}

fn advisory_table(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::{Assigned, Cancelled, Closed, Completed, Disputed, InProgress, Pending};

    matches!(
        (from, to),
        (Pending, Assigned)
            | (Assigned, InProgress)
            | (InProgress, Completed)
            | (InProgress, Disputed)
            | (Disputed, Closed)
            | (Pending, Cancelled)
            | (Assigned, Cancelled)
    )
}

fn litigation_table(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::{
        Assigned, Cancelled, Closed, Completed, Disputed, InProgress, Pending, QuoteSent,
    };

    matches!(
        (from, to),
        (Pending, Assigned)
            | (Assigned, QuoteSent)
            | (QuoteSent, Assigned)
            | (QuoteSent, InProgress)
            | (InProgress, Completed)
            | (InProgress, Disputed)
            | (Disputed, Closed)
            | (Pending, Cancelled)
            | (Assigned, Cancelled)
            | (QuoteSent, Cancelled)
    )
}

fn service_table(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::{
        Assigned, Cancelled, Closed, Completed, Disputed, InProgress, Pending, QuoteSent,
    };

    matches!(
        (from, to),
        (Pending, Assigned)
            | (Assigned, QuoteSent)
            | (Assigned, InProgress)
            | (QuoteSent, InProgress)
            | (InProgress, Completed)
            | (InProgress, Disputed)
            | (Disputed, Closed)
            | (Pending, Cancelled)
            | (Assigned, Cancelled)
            | (QuoteSent, Cancelled)
    )
}
