//! Pure lifecycle operations over request snapshots.
//!
//! Each operation validates its time guards, checks the transition table and
//! returns the next snapshot. Nothing here touches storage; see
//! [`crate::lifecycle::LifecycleService`] for the persisting wrapper.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::provider::ProviderId;
use crate::domain::request::{CallDetails, RequestDetails, RequestStatus, ServiceRequest, SlaStatus};
use crate::lifecycle::states::{can_modify, transition, TransitionError};
use crate::sla::clock::classify;

/// How early before its scheduled time a call may be started.
pub const START_GRACE: Duration = Duration::minutes(15);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum LifecycleOperation {
    Assign { provider_id: ProviderId },
    Schedule { at: DateTime<Utc>, call_link: Option<String> },
    Start,
    End,
    Cancel,
    MarkNoShow,
    Reschedule { at: DateTime<Utc> },
    SendQuote,
    Dispute,
    Close,
    UpdateCallLink { call_link: String },
}

impl LifecycleOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Schedule { .. } => "schedule",
            Self::Start => "start",
            Self::End => "end",
            Self::Cancel => "cancel",
            Self::MarkNoShow => "mark_no_show",
            Self::Reschedule { .. } => "reschedule",
            Self::SendQuote => "send_quote",
            Self::Dispute => "dispute",
            Self::Close => "close",
            Self::UpdateCallLink { .. } => "update_call_link",
        }
    }

    pub fn apply(
        &self,
        request: &ServiceRequest,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, TransitionError> {
        match self {
            Self::Assign { provider_id } => assign(request, provider_id.clone(), now),
            Self::Schedule { at, call_link } => schedule(request, *at, call_link.clone(), now),
            Self::Start => start(request, now),
            Self::End => end(request, now),
            Self::Cancel => cancel(request, now),
            Self::MarkNoShow => mark_no_show(request, now),
            Self::Reschedule { at } => reschedule(request, *at, now),
            Self::SendQuote => move_to(request, RequestStatus::QuoteSent, now),
            Self::Dispute => move_to(request, RequestStatus::Disputed, now),
            Self::Close => move_to(request, RequestStatus::Closed, now),
            Self::UpdateCallLink { call_link } => update_call_link(request, call_link, now),
        }
    }
}

pub fn assign(
    request: &ServiceRequest,
    provider_id: ProviderId,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, TransitionError> {
    let mut next = move_to(request, RequestStatus::Assigned, now)?;
    next.assigned_provider_id = Some(provider_id);
    Ok(next)
}

pub fn schedule(
    request: &ServiceRequest,
    at: DateTime<Utc>,
    call_link: Option<String>,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, TransitionError> {
    if at <= now {
        return Err(TransitionError::ScheduleInPast { requested_at: at, now });
    }

    let mut next = move_to(request, RequestStatus::Scheduled, now)?;
    let details = call_details_mut(&mut next, "schedule")?;
    details.scheduled_at = Some(at);
    if call_link.is_some() {
        details.call_link = call_link;
    }
    Ok(next)
}

pub fn start(request: &ServiceRequest, now: DateTime<Utc>) -> Result<ServiceRequest, TransitionError> {
    if let Some(details) = request.call_details() {
        let scheduled_at = details.scheduled_at.ok_or(TransitionError::NotScheduled)?;
        let earliest_start = scheduled_at - START_GRACE;
        if now < earliest_start {
            return Err(TransitionError::TooEarlyToStart { earliest_start });
        }
    }

    move_to(request, RequestStatus::InProgress, now)
}

/// Completes the request and freezes its SLA classification at completion
/// time. A breached request stays breached.
pub fn end(request: &ServiceRequest, now: DateTime<Utc>) -> Result<ServiceRequest, TransitionError> {
    let mut next = move_to(request, RequestStatus::Completed, now)?;
    next.completed_at = Some(now);
    if request.sla_status != SlaStatus::Breached {
        next.sla_status = match classify(now, request.sla_deadline, Duration::zero()) {
            SlaStatus::Breached => SlaStatus::Breached,
            _ => SlaStatus::OnTrack,
        };
    }
    Ok(next)
}

pub fn cancel(request: &ServiceRequest, now: DateTime<Utc>) -> Result<ServiceRequest, TransitionError> {
    let mut next = move_to(request, RequestStatus::Cancelled, now)?;
    if request.status == RequestStatus::Pending {
        next.assigned_provider_id = None;
    }
    Ok(next)
}

pub fn mark_no_show(
    request: &ServiceRequest,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, TransitionError> {
    let details = request.call_details().ok_or(TransitionError::UnsupportedOperation {
        request_type: request.request_type(),
        operation: "mark_no_show",
    })?;
    let scheduled_at = details.scheduled_at.ok_or(TransitionError::NotScheduled)?;
    if now < scheduled_at {
        return Err(TransitionError::NoShowBeforeScheduledTime { scheduled_at });
    }

    move_to(request, RequestStatus::NoShow, now)
}

pub fn reschedule(
    request: &ServiceRequest,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, TransitionError> {
    if at <= now {
        return Err(TransitionError::ScheduleInPast { requested_at: at, now });
    }

    let mut next = move_to(request, RequestStatus::Rescheduled, now)?;
    let details = call_details_mut(&mut next, "reschedule")?;
    details.scheduled_at = Some(at);
    details.reschedule_count += 1;
    Ok(next)
}

pub fn update_call_link(
    request: &ServiceRequest,
    call_link: &str,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, TransitionError> {
    if !can_modify(request.status) {
        return Err(TransitionError::NotModifiable { status: request.status });
    }

    let mut next = request.clone();
    let details = call_details_mut(&mut next, "update_call_link")?;
    details.call_link = Some(call_link.trim().to_string());
    next.updated_at = now;
    Ok(next)
}

fn move_to(
    request: &ServiceRequest,
    target: RequestStatus,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, TransitionError> {
    transition(request.request_type(), request.status, target)?;

    let mut next = request.clone();
    next.status = target;
    next.updated_at = now;
    Ok(next)
}

fn call_details_mut<'a>(
    request: &'a mut ServiceRequest,
    operation: &'static str,
) -> Result<&'a mut CallDetails, TransitionError> {
    let request_type = request.request_type();
    match &mut request.details {
        RequestDetails::Call(details) => Ok(details),
        _ => Err(TransitionError::UnsupportedOperation { request_type, operation }),
    }
}
