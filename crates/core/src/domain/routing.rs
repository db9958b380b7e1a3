use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::provider::{ProviderCandidate, ProviderId};
use crate::domain::request::RequestAttributes;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum ConditionValue {
    Any,
    Equals(String),
    OneOf(Vec<String>),
}

impl ConditionValue {
    /// A wildcard value (`*` or `any`) accepts the attribute even when the
    /// request does not carry it, same as [`ConditionValue::Any`].
    pub fn accepts(&self, actual: Option<&str>) -> bool {
        if self.values().iter().any(|value| is_wildcard(value)) {
            return true;
        }
        match self {
            Self::Any => true,
            Self::Equals(expected) => actual.is_some_and(|value| contains_key(expected, value)),
            Self::OneOf(expected) => actual.is_some_and(|value| {
                expected.iter().any(|candidate| contains_key(candidate, value))
            }),
        }
    }

    fn values(&self) -> &[String] {
        match self {
            Self::Any => &[],
            Self::Equals(value) => std::slice::from_ref(value),
            Self::OneOf(values) => values,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default)]
    pub match_all: bool,
    #[serde(default)]
    pub predicates: BTreeMap<String, ConditionValue>,
}

impl RuleConditions {
    pub fn catch_all() -> Self {
        Self { match_all: true, predicates: BTreeMap::new() }
    }

    pub fn with(mut self, key: impl Into<String>, value: ConditionValue) -> Self {
        self.predicates.insert(key.into(), value);
        self
    }

    pub fn equals(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(key, ConditionValue::Equals(value.into()))
    }

    /// Every predicate must accept the request's attribute. A catch-all rule
    /// with no predicates matches everything.
    pub fn matches(&self, attributes: &RequestAttributes) -> bool {
        if self.predicates.is_empty() {
            return self.match_all;
        }

        self.predicates
            .iter()
            .all(|(key, condition)| condition.accepts(attributes.get(key).as_deref()))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty() && !self.match_all
    }

    pub fn blank_entries(&self) -> Vec<String> {
        let mut blanks = Vec::new();
        for (key, condition) in &self.predicates {
            if key.trim().is_empty() {
                blanks.push("<empty key>".to_string());
                continue;
            }
            if let ConditionValue::OneOf(values) = condition {
                if values.is_empty() {
                    blanks.push(key.clone());
                    continue;
                }
            }
            if condition.values().iter().any(|value| value.trim().is_empty()) {
                blanks.push(key.clone());
            }
        }
        blanks
    }

    pub fn to_storage(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_storage(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCriteria {
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub requires_certification: bool,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub min_experience_years: Option<u32>,
    #[serde(default)]
    pub max_active_requests: Option<u32>,
}

impl TargetCriteria {
    pub fn admits(&self, candidate: &ProviderCandidate) -> bool {
        if !self.specializations.is_empty()
            && !self.specializations.iter().any(|wanted| candidate.has_specialization(wanted))
        {
            return false;
        }

        if self.requires_certification && !candidate.certified {
            return false;
        }

        if let Some(region) = &self.region {
            let in_region =
                candidate.region.as_deref().is_some_and(|actual| contains_key(region, actual));
            if !in_region {
                return false;
            }
        }

        if let Some(min_years) = self.min_experience_years {
            if candidate.experience_years < min_years {
                return false;
            }
        }

        if let Some(capacity) = self.max_active_requests {
            if candidate.active_request_count >= capacity {
                return false;
            }
        }

        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum TargetStrategy {
    Pool(TargetCriteria),
    SpecificProvider { provider_id: ProviderId },
}

impl TargetStrategy {
    pub fn to_storage(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_storage(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: RuleId,
    pub name: String,
    pub priority: i32,
    pub active: bool,
    pub conditions: RuleConditions,
    pub target: TargetStrategy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoutingRule {
    pub fn matches(&self, attributes: &RequestAttributes) -> bool {
        self.conditions.matches(attributes)
    }

    /// Total evaluation order among matching rules: priority, then creation
    /// time, then id.
    pub fn evaluation_order(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Administrator input for creating or replacing a rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    pub priority: i32,
    pub active: bool,
    pub conditions: RuleConditions,
    pub target: TargetStrategy,
}

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

pub(crate) fn contains_key(candidate: &str, value: &str) -> bool {
    is_wildcard(candidate) || normalize_key(candidate) == normalize_key(value)
}

fn is_wildcard(candidate: &str) -> bool {
    matches!(normalize_key(candidate).as_str(), "*" | "any")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        ConditionValue, RoutingRule, RuleConditions, RuleId, TargetCriteria, TargetStrategy,
    };
    use crate::domain::provider::ProviderId;
    use crate::domain::request::{RequestAttributes, RequestType, Urgency};

    fn battery() -> Vec<RequestAttributes> {
        vec![
            RequestAttributes::new(RequestType::Consultation, "consultation", Urgency::Urgent),
            RequestAttributes::new(RequestType::Consultation, "consultation", Urgency::Normal)
                .with_region("north"),
            RequestAttributes::new(RequestType::Litigation, "tax-dispute", Urgency::High)
                .with_region("south"),
            RequestAttributes::new(RequestType::Call, "call", Urgency::Low)
                .with_extra("language", "fr"),
            RequestAttributes::new(RequestType::Service, "Notary", Urgency::Urgent)
                .with_region("NORTH"),
        ]
    }

    fn rich_conditions() -> RuleConditions {
        RuleConditions::default()
            .equals("category", "consultation")
            .with("urgency", ConditionValue::OneOf(vec!["urgent".into(), "high".into()]))
            .with("region", ConditionValue::Any)
    }

    #[test]
    fn equality_predicates_are_case_insensitive_and_support_wildcards() {
        let attributes =
            RequestAttributes::new(RequestType::Service, "Notary", Urgency::Urgent);

        assert!(RuleConditions::default().equals("category", "notary").matches(&attributes));
        assert!(RuleConditions::default().equals("category", "*").matches(&attributes));
        assert!(RuleConditions::default().equals("category", "any").matches(&attributes));
        assert!(!RuleConditions::default().equals("category", "tax").matches(&attributes));
    }

    #[test]
    fn specific_predicate_on_absent_attribute_does_not_match() {
        let attributes =
            RequestAttributes::new(RequestType::Consultation, "consultation", Urgency::Normal);

        assert!(!RuleConditions::default().equals("region", "north").matches(&attributes));
        assert!(RuleConditions::default().with("region", ConditionValue::Any).matches(&attributes));
    }

    #[test]
    fn wildcard_values_accept_an_absent_attribute() {
        let attributes =
            RequestAttributes::new(RequestType::Consultation, "consultation", Urgency::Normal);

        assert!(RuleConditions::default().equals("region", "any").matches(&attributes));
        assert!(RuleConditions::default().equals("region", " * ").matches(&attributes));
        assert!(RuleConditions::default()
            .with("region", ConditionValue::OneOf(vec!["north".into(), "ANY".into()]))
            .matches(&attributes));
        assert!(!RuleConditions::default()
            .with("region", ConditionValue::OneOf(vec!["north".into()]))
            .matches(&attributes));
    }

    #[test]
    fn empty_conditions_only_match_when_flagged_catch_all() {
        let attributes =
            RequestAttributes::new(RequestType::Call, "call", Urgency::Low);

        assert!(RuleConditions::catch_all().matches(&attributes));
        assert!(!RuleConditions::default().matches(&attributes));
        assert!(RuleConditions::default().is_empty());
    }

    #[test]
    fn conditions_storage_form_preserves_matching_behaviour() {
        let conditions_set = [
            rich_conditions(),
            RuleConditions::catch_all(),
            RuleConditions::default().equals("language", "fr"),
            RuleConditions::default()
                .equals("request_type", "litigation")
                .equals("region", "south"),
            RuleConditions::default().equals("region", "any"),
            RuleConditions::default().with("region", ConditionValue::OneOf(vec!["*".into()])),
        ];

        for conditions in conditions_set {
            let stored = conditions.to_storage().expect("serialize conditions");
            let restored = RuleConditions::from_storage(&stored).expect("deserialize conditions");

            for attributes in battery() {
                assert_eq!(
                    conditions.matches(&attributes),
                    restored.matches(&attributes),
                    "matching diverged after storage for {stored} on {attributes:?}"
                );
            }
        }
    }

    #[test]
    fn target_strategy_storage_form_is_tagged() {
        let pool = TargetStrategy::Pool(TargetCriteria {
            specializations: vec!["tax".to_string()],
            requires_certification: true,
            ..TargetCriteria::default()
        });
        let direct = TargetStrategy::SpecificProvider { provider_id: ProviderId("P-9".into()) };

        for target in [pool, direct] {
            let stored = target.to_storage().expect("serialize target");
            assert!(stored.contains("\"strategy\""));
            assert_eq!(TargetStrategy::from_storage(&stored).expect("deserialize"), target);
        }
    }

    #[test]
    fn blank_condition_values_are_reported() {
        let conditions = RuleConditions::default()
            .equals("category", " ")
            .with("urgency", ConditionValue::OneOf(Vec::new()))
            .equals("region", "north");

        assert_eq!(conditions.blank_entries(), vec!["category".to_string(), "urgency".to_string()]);
    }

    #[test]
    fn evaluation_order_breaks_priority_ties_by_creation_then_id() {
        let now = Utc::now();
        let rule = |id: &str, priority: i32, offset_secs: i64| RoutingRule {
            id: RuleId(id.to_string()),
            name: id.to_string(),
            priority,
            active: true,
            conditions: RuleConditions::catch_all(),
            target: TargetStrategy::Pool(TargetCriteria::default()),
            created_at: now + chrono::Duration::seconds(offset_secs),
            updated_at: now,
        };

        let mut rules = vec![rule("r-c", 5, 0), rule("r-b", 5, -10), rule("r-a", 5, 0), rule("r-z", 1, 99)];
        rules.sort_by(|left, right| left.evaluation_order(right));
        let ids: Vec<&str> = rules.iter().map(|rule| rule.id.0.as_str()).collect();

        assert_eq!(ids, vec!["r-z", "r-b", "r-a", "r-c"]);
    }
}
