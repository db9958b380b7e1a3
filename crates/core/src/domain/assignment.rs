use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::provider::ProviderId;
use crate::domain::request::RequestId;
use crate::domain::routing::RuleId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentFailureReason {
    NoRuleMatched,
    NoProviderAvailable,
    Timeout,
    ConcurrencyConflict,
    Error,
}

impl AssignmentFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRuleMatched => "no_rule_matched",
            Self::NoProviderAvailable => "no_provider_available",
            Self::Timeout => "timeout",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "no_rule_matched" => Some(Self::NoRuleMatched),
            "no_provider_available" => Some(Self::NoProviderAvailable),
            "timeout" => Some(Self::Timeout),
            "concurrency_conflict" => Some(Self::ConcurrencyConflict),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Auto,
    Manual,
}

impl AssignmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Outcome of one assignment attempt. Built once and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub request_id: RequestId,
    pub success: bool,
    pub provider_id: Option<ProviderId>,
    pub rule_id: Option<RuleId>,
    pub reason: Option<AssignmentFailureReason>,
    pub already_assigned: bool,
    pub occurred_at: DateTime<Utc>,
}

impl AssignmentResult {
    pub fn assigned(
        request_id: RequestId,
        provider_id: ProviderId,
        rule_id: Option<RuleId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            success: true,
            provider_id: Some(provider_id),
            rule_id,
            reason: None,
            already_assigned: false,
            occurred_at,
        }
    }

    pub fn existing(
        request_id: RequestId,
        provider_id: ProviderId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            success: true,
            provider_id: Some(provider_id),
            rule_id: None,
            reason: None,
            already_assigned: true,
            occurred_at,
        }
    }

    pub fn failed(
        request_id: RequestId,
        reason: AssignmentFailureReason,
        rule_id: Option<RuleId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            success: false,
            provider_id: None,
            rule_id,
            reason: Some(reason),
            already_assigned: false,
            occurred_at,
        }
    }
}

/// Append-only history row backing routing statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: String,
    pub request_id: RequestId,
    pub kind: AssignmentKind,
    pub success: bool,
    pub provider_id: Option<ProviderId>,
    pub rule_id: Option<RuleId>,
    pub reason: Option<AssignmentFailureReason>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AssignmentRecord {
    pub fn from_result(
        result: &AssignmentResult,
        kind: AssignmentKind,
        note: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: result.request_id.clone(),
            kind,
            success: result.success,
            provider_id: result.provider_id.clone(),
            rule_id: result.rule_id.clone(),
            reason: result.reason,
            note,
            occurred_at: result.occurred_at,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub total_attempts: u64,
    pub successful: u64,
    pub failed: u64,
    pub manual_reassignments: u64,
    pub by_rule: BTreeMap<String, u64>,
    pub by_provider: BTreeMap<String, u64>,
    pub by_failure_reason: BTreeMap<String, u64>,
}

impl RoutingStats {
    pub fn from_records(records: &[AssignmentRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.total_attempts += 1;
            if record.kind == AssignmentKind::Manual {
                stats.manual_reassignments += 1;
            }

            if record.success {
                stats.successful += 1;
                if let Some(provider_id) = &record.provider_id {
                    *stats.by_provider.entry(provider_id.0.clone()).or_default() += 1;
                }
                if let Some(rule_id) = &record.rule_id {
                    *stats.by_rule.entry(rule_id.0.clone()).or_default() += 1;
                }
            } else {
                stats.failed += 1;
                let reason =
                    record.reason.map(|reason| reason.as_str()).unwrap_or("unknown").to_string();
                *stats.by_failure_reason.entry(reason).or_default() += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        AssignmentFailureReason, AssignmentKind, AssignmentRecord, AssignmentResult, RoutingStats,
    };
    use crate::domain::provider::ProviderId;
    use crate::domain::request::RequestId;
    use crate::domain::routing::RuleId;

    #[test]
    fn stats_aggregate_by_rule_provider_and_reason() {
        let now = Utc::now();
        let request = |id: &str| RequestId(id.to_string());
        let results = [
            (
                AssignmentResult::assigned(
                    request("R-1"),
                    ProviderId("P-1".into()),
                    Some(RuleId("rule-a".into())),
                    now,
                ),
                AssignmentKind::Auto,
            ),
            (
                AssignmentResult::assigned(
                    request("R-2"),
                    ProviderId("P-1".into()),
                    Some(RuleId("rule-b".into())),
                    now,
                ),
                AssignmentKind::Auto,
            ),
            (
                AssignmentResult::failed(
                    request("R-3"),
                    AssignmentFailureReason::NoRuleMatched,
                    None,
                    now,
                ),
                AssignmentKind::Auto,
            ),
            (
                AssignmentResult::assigned(request("R-1"), ProviderId("P-2".into()), None, now),
                AssignmentKind::Manual,
            ),
        ];
        let records: Vec<AssignmentRecord> = results
            .iter()
            .map(|(result, kind)| AssignmentRecord::from_result(result, *kind, None))
            .collect();

        let stats = RoutingStats::from_records(&records);

        assert_eq!(stats.total_attempts, 4);
        assert_eq!(stats.successful, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.manual_reassignments, 1);
        assert_eq!(stats.by_provider.get("P-1"), Some(&2));
        assert_eq!(stats.by_provider.get("P-2"), Some(&1));
        assert_eq!(stats.by_rule.get("rule-a"), Some(&1));
        assert_eq!(stats.by_failure_reason.get("no_rule_matched"), Some(&1));
    }

    #[test]
    fn failure_reason_round_trips_from_storage_encoding() {
        for reason in [
            AssignmentFailureReason::NoRuleMatched,
            AssignmentFailureReason::NoProviderAvailable,
            AssignmentFailureReason::Timeout,
            AssignmentFailureReason::ConcurrencyConflict,
            AssignmentFailureReason::Error,
        ] {
            assert_eq!(AssignmentFailureReason::parse(reason.as_str()), Some(reason));
        }
    }
}
