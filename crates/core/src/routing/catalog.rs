use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::RequestAttributes;
use crate::domain::routing::{RoutingRule, RuleDraft, RuleId, TargetStrategy};
use crate::errors::{ApplicationError, DomainError};
use crate::ports::RoutingRuleStore;

/// Dry-run outcome of matching one stored rule against sample attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTestReport {
    pub rule_id: RuleId,
    pub active: bool,
    pub matched: bool,
    /// Rule that `find_applicable_rule` would pick for the same sample.
    pub applicable_rule_id: Option<RuleId>,
}

impl RuleTestReport {
    /// The rule matches but an earlier rule takes precedence, or it is inactive.
    pub fn is_shadowed(&self) -> bool {
        self.matched && self.applicable_rule_id.as_ref() != Some(&self.rule_id)
    }
}

pub struct RoutingRuleCatalog {
    store: Arc<dyn RoutingRuleStore>,
    audit: Arc<dyn AuditSink>,
}

impl RoutingRuleCatalog {
    pub fn new(store: Arc<dyn RoutingRuleStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn create(
        &self,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<RoutingRule, ApplicationError> {
        validate_draft(&draft)?;

        let rule = RoutingRule {
            id: RuleId(format!("rule-{}", Uuid::new_v4())),
            name: draft.name.trim().to_string(),
            priority: draft.priority,
            active: draft.active,
            conditions: draft.conditions,
            target: draft.target,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(rule.clone()).await?;

        info!(event_name = "rules.created", rule_id = %rule.id.0, priority = rule.priority, "routing rule created");
        self.record("rules.created", &rule.id, now);
        Ok(rule)
    }

    pub async fn update(
        &self,
        id: &RuleId,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<RoutingRule, ApplicationError> {
        validate_draft(&draft)?;
        let existing = self.get(id).await?;

        let rule = RoutingRule {
            name: draft.name.trim().to_string(),
            priority: draft.priority,
            active: draft.active,
            conditions: draft.conditions,
            target: draft.target,
            updated_at: now,
            ..existing
        };
        self.replace(rule, "rules.updated", now).await
    }

    pub async fn toggle_active(
        &self,
        id: &RuleId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<RoutingRule, ApplicationError> {
        let existing = self.get(id).await?;
        let rule = RoutingRule { active, updated_at: now, ..existing };
        self.replace(rule, "rules.toggled", now).await
    }

    pub async fn delete(&self, id: &RuleId, now: DateTime<Utc>) -> Result<(), ApplicationError> {
        if !self.store.remove(id).await? {
            return Err(ApplicationError::not_found("routing rule", id.0.clone()));
        }

        info!(event_name = "rules.deleted", rule_id = %id.0, "routing rule deleted");
        self.record("rules.deleted", id, now);
        Ok(())
    }

    pub async fn get(&self, id: &RuleId) -> Result<RoutingRule, ApplicationError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("routing rule", id.0.clone()))
    }

    /// All rules, active or not, in evaluation order.
    pub async fn list(&self) -> Result<Vec<RoutingRule>, ApplicationError> {
        let mut rules = self.store.list().await?;
        rules.sort_by(|left, right| left.evaluation_order(right));
        Ok(rules)
    }

    pub async fn test(
        &self,
        id: &RuleId,
        sample: &RequestAttributes,
    ) -> Result<RuleTestReport, ApplicationError> {
        let rule = self.get(id).await?;
        let applicable = self.find_applicable_rule(sample).await?;

        Ok(RuleTestReport {
            rule_id: rule.id.clone(),
            active: rule.active,
            matched: rule.matches(sample),
            applicable_rule_id: applicable.map(|rule| rule.id),
        })
    }

    /// Lowest `(priority, created_at, id)` among active rules matching
    /// `attributes`, or `None`.
    pub async fn find_applicable_rule(
        &self,
        attributes: &RequestAttributes,
    ) -> Result<Option<RoutingRule>, ApplicationError> {
        if attributes.category.trim().is_empty() {
            return Err(ApplicationError::validation("request attributes are missing a category"));
        }

        let rules = self.store.list().await?;
        let selected = rules
            .into_iter()
            .filter(|rule| rule.active && rule.matches(attributes))
            .min_by(|left, right| left.evaluation_order(right));

        debug!(
            event_name = "rules.match.evaluated",
            category = %attributes.category,
            request_type = attributes.request_type.as_str(),
            rule_id = selected.as_ref().map(|rule| rule.id.0.as_str()).unwrap_or("none"),
            "routing rules evaluated"
        );
        Ok(selected)
    }

    async fn replace(
        &self,
        rule: RoutingRule,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<RoutingRule, ApplicationError> {
        if !self.store.replace(rule.clone()).await? {
            return Err(ApplicationError::not_found("routing rule", rule.id.0.clone()));
        }

        info!(event_name = event_type, rule_id = %rule.id.0, active = rule.active, "routing rule changed");
        self.record(event_type, &rule.id, now);
        Ok(rule)
    }

    fn record(&self, event_type: &str, rule_id: &RuleId, now: DateTime<Utc>) {
        self.audit.emit(
            AuditEvent::new(
                None,
                rule_id.0.clone(),
                event_type,
                AuditCategory::Rules,
                "routing-catalog",
                AuditOutcome::Success,
            )
            .with_metadata("rule_id", rule_id.0.clone())
            .at(now),
        );
    }
}

pub fn validate_draft(draft: &RuleDraft) -> Result<(), DomainError> {
    if draft.name.trim().is_empty() {
        return Err(DomainError::Validation("rule name must not be blank".to_string()));
    }

    if draft.conditions.is_empty() {
        return Err(DomainError::Validation(
            "rule needs at least one condition or the match_all flag".to_string(),
        ));
    }

    let blanks = draft.conditions.blank_entries();
    if !blanks.is_empty() {
        return Err(DomainError::Validation(format!(
            "rule conditions have blank keys or values: {}",
            blanks.join(", ")
        )));
    }

    match &draft.target {
        TargetStrategy::SpecificProvider { provider_id } if provider_id.0.trim().is_empty() => {
            Err(DomainError::Validation("target provider id must not be blank".to_string()))
        }
        TargetStrategy::SpecificProvider { .. } => Ok(()),
        TargetStrategy::Pool(criteria) => {
            if criteria.specializations.iter().any(|value| value.trim().is_empty()) {
                return Err(DomainError::Validation(
                    "target specializations must not contain blank entries".to_string(),
                ));
            }
            if criteria.region.as_deref().is_some_and(|region| region.trim().is_empty()) {
                return Err(DomainError::Validation("target region must not be blank".to_string()));
            }
            if criteria.max_active_requests == Some(0) {
                return Err(DomainError::Validation(
                    "max_active_requests must be greater than zero".to_string(),
                ));
            }
            Ok(())
        }
    }
}
