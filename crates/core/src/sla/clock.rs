use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::domain::request::{RequestType, SlaStatus, Urgency};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlaPolicyError {
    #[error("no SLA hours configured for {request_type:?}/{urgency:?}")]
    MissingEntry { request_type: RequestType, urgency: Urgency },
    #[error("SLA hours for {request_type:?}/{urgency:?} must be greater than zero")]
    NonPositiveHours { request_type: RequestType, urgency: Urgency },
    #[error("SLA warning window must not be negative")]
    NegativeWarningWindow,
}

/// Deadline table plus the at-risk warning window.
///
/// Construction validates that the table is total over every
/// (request type, urgency) pair, so deadline lookups cannot fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlaClock {
    hours: BTreeMap<(RequestType, Urgency), u32>,
    warning_window: Duration,
}

impl SlaClock {
    pub fn new(
        hours: BTreeMap<(RequestType, Urgency), u32>,
        warning_window: Duration,
    ) -> Result<Self, SlaPolicyError> {
        if warning_window < Duration::zero() {
            return Err(SlaPolicyError::NegativeWarningWindow);
        }

        for request_type in RequestType::ALL {
            for urgency in Urgency::ALL {
                match hours.get(&(request_type, urgency)) {
                    None => return Err(SlaPolicyError::MissingEntry { request_type, urgency }),
                    Some(0) => {
                        return Err(SlaPolicyError::NonPositiveHours { request_type, urgency })
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(Self { hours, warning_window })
    }

    /// Default table with a two hour warning window.
    pub fn standard() -> Self {
        Self { hours: standard_hours(), warning_window: Duration::hours(2) }
    }

    /// Returns a copy of the standard table with `overrides` applied on top.
    pub fn with_overrides(
        overrides: &BTreeMap<(RequestType, Urgency), u32>,
        warning_window: Duration,
    ) -> Result<Self, SlaPolicyError> {
        let mut hours = standard_hours();
        hours.extend(overrides.iter().map(|(key, value)| (*key, *value)));
        Self::new(hours, warning_window)
    }

    pub fn hours_for(&self, request_type: RequestType, urgency: Urgency) -> u32 {
        self.hours.get(&(request_type, urgency)).copied().unwrap_or_default()
    }

    pub fn warning_window(&self) -> Duration {
        self.warning_window
    }

    pub fn compute_deadline(
        &self,
        request_type: RequestType,
        urgency: Urgency,
        submitted_at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        submitted_at + Duration::hours(i64::from(self.hours_for(request_type, urgency)))
    }

    pub fn classify(&self, now: DateTime<Utc>, deadline: DateTime<Utc>) -> SlaStatus {
        classify(now, deadline, self.warning_window)
    }

    pub fn reclassify(
        &self,
        previous: SlaStatus,
        now: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> SlaStatus {
        reclassify(previous, now, deadline, self.warning_window)
    }
}

impl Default for SlaClock {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn classify(now: DateTime<Utc>, deadline: DateTime<Utc>, warning_window: Duration) -> SlaStatus {
    if now >= deadline {
        return SlaStatus::Breached;
    }
    if deadline - now <= warning_window {
        return SlaStatus::AtRisk;
    }
    SlaStatus::OnTrack
}

/// Like [`classify`], but a breached request stays breached. Only
/// reassignment may reset the classification.
pub fn reclassify(
    previous: SlaStatus,
    now: DateTime<Utc>,
    deadline: DateTime<Utc>,
    warning_window: Duration,
) -> SlaStatus {
    if previous == SlaStatus::Breached {
        return SlaStatus::Breached;
    }
    classify(now, deadline, warning_window)
}

fn standard_hours() -> BTreeMap<(RequestType, Urgency), u32> {
    let rows: [(RequestType, [u32; 4]); 5] = [
        // low, normal, high, urgent
        (RequestType::Consultation, [48, 24, 8, 4]),
        (RequestType::Call, [24, 12, 4, 2]),
        (RequestType::LegalOpinion, [120, 72, 48, 24]),
        (RequestType::Litigation, [96, 72, 48, 24]),
        (RequestType::Service, [72, 48, 24, 8]),
    ];

    rows.into_iter()
        .flat_map(|(request_type, hours)| {
            Urgency::ALL.into_iter().zip(hours).map(move |(urgency, h)| ((request_type, urgency), h))
        })
        .collect()
}
