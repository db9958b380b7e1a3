use caseflow_core::domain::provider::{OrganizationId, ProviderId, ProviderProfile};
use caseflow_core::domain::routing::{
    ConditionValue, RoutingRule, RuleConditions, RuleId, TargetCriteria, TargetStrategy,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlProviderDirectory, SqlRoutingRuleStore};

struct SeedProvider {
    provider_id: &'static str,
    organization_id: &'static str,
    display_name: &'static str,
    specializations: &'static [&'static str],
    certified: bool,
    experience_years: u32,
    /// Tenths of a point, e.g. `47` is 4.7.
    rating_tenths: Option<i64>,
    region: Option<&'static str>,
    can_accept_requests: bool,
}

const SEED_PROVIDERS: &[SeedProvider] = &[
    SeedProvider {
        provider_id: "prov-tax-001",
        organization_id: "org-north-001",
        display_name: "Amina Haddad",
        specializations: &["tax", "corporate"],
        certified: true,
        experience_years: 12,
        rating_tenths: Some(48),
        region: Some("north"),
        can_accept_requests: true,
    },
    SeedProvider {
        provider_id: "prov-tax-002",
        organization_id: "org-north-001",
        display_name: "Jonas Weber",
        specializations: &["tax"],
        certified: false,
        experience_years: 4,
        rating_tenths: Some(42),
        region: Some("north"),
        can_accept_requests: true,
    },
    SeedProvider {
        provider_id: "prov-family-001",
        organization_id: "org-south-001",
        display_name: "Lucia Romano",
        specializations: &["family", "civil"],
        certified: true,
        experience_years: 9,
        rating_tenths: None,
        region: Some("south"),
        can_accept_requests: true,
    },
    SeedProvider {
        provider_id: "prov-lit-001",
        organization_id: "org-south-001",
        display_name: "Omar Said",
        specializations: &["litigation", "civil"],
        certified: true,
        experience_years: 15,
        rating_tenths: Some(45),
        region: None,
        can_accept_requests: false,
    },
];

struct SeedRule {
    id: &'static str,
    name: &'static str,
    priority: i32,
    conditions: &'static [(&'static str, &'static [&'static str])],
    specializations: &'static [&'static str],
    requires_certification: bool,
    max_active_requests: Option<u32>,
}

const SEED_RULES: &[SeedRule] = &[
    SeedRule {
        id: "rule-urgent-tax",
        name: "Urgent tax consultations",
        priority: 1,
        conditions: &[
            ("request_type", &["consultation", "call"]),
            ("category", &["tax"]),
            ("urgency", &["high", "urgent"]),
        ],
        specializations: &["tax"],
        requires_certification: true,
        max_active_requests: Some(5),
    },
    SeedRule {
        id: "rule-family",
        name: "Family matters",
        priority: 10,
        conditions: &[("category", &["family"])],
        specializations: &["family"],
        requires_certification: false,
        max_active_requests: None,
    },
    SeedRule {
        id: "rule-catch-all",
        name: "General pool",
        priority: 100,
        conditions: &[],
        specializations: &[],
        requires_certification: false,
        max_active_requests: Some(10),
    },
];

const SEEDED_AT: &str = "2026-01-01T00:00:00Z";

/// Deterministic demo providers and routing rules for local runs.
///
/// Loading is idempotent: providers are upserted and rules replaced by id.
pub struct DemoDataset;

impl DemoDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directory = SqlProviderDirectory::new(pool.clone());
        for provider in SEED_PROVIDERS {
            directory.upsert(&provider_profile(provider)).await?;
        }

        let rules = SqlRoutingRuleStore::new(pool.clone());
        let seeded_at = seeded_at()?;
        for seed in SEED_RULES {
            let rule = routing_rule(seed, seeded_at);
            if !rules.replace_row(&rule).await? {
                rules.insert_row(&rule).await?;
            }
        }

        Ok(SeedResult {
            providers_seeded: SEED_PROVIDERS.iter().map(|provider| provider.provider_id).collect(),
            rules_seeded: SEED_RULES.iter().map(|rule| rule.id).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for provider in SEED_PROVIDERS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM provider_profile WHERE provider_id = ?1 AND can_accept_requests = ?2)",
            )
            .bind(provider.provider_id)
            .bind(provider.can_accept_requests)
            .fetch_one(pool)
            .await?;
            checks.push((provider.provider_id, exists == 1));
        }

        for rule in SEED_RULES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM routing_rule WHERE id = ?1 AND priority = ?2 AND active = 1)",
            )
            .bind(rule.id)
            .bind(rule.priority)
            .fetch_one(pool)
            .await?;
            checks.push((rule.id, exists == 1));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for provider in SEED_PROVIDERS {
            sqlx::query("DELETE FROM provider_profile WHERE provider_id = ?1")
                .bind(provider.provider_id)
                .execute(&mut *tx)
                .await?;
        }
        for rule in SEED_RULES {
            sqlx::query("DELETE FROM routing_rule WHERE id = ?1")
                .bind(rule.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn seeded_at() -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(SEEDED_AT)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid seed timestamp: {error}")))
}

fn provider_profile(seed: &SeedProvider) -> ProviderProfile {
    ProviderProfile {
        provider_id: ProviderId(seed.provider_id.to_string()),
        organization_id: OrganizationId(seed.organization_id.to_string()),
        display_name: seed.display_name.to_string(),
        specializations: seed.specializations.iter().map(|value| value.to_string()).collect(),
        certified: seed.certified,
        experience_years: seed.experience_years,
        rating: seed.rating_tenths.map(|tenths| Decimal::new(tenths, 1)),
        region: seed.region.map(str::to_string),
        is_active: true,
        can_accept_requests: seed.can_accept_requests,
        organization_approved: true,
    }
}

fn routing_rule(seed: &SeedRule, seeded_at: DateTime<Utc>) -> RoutingRule {
    let conditions = if seed.conditions.is_empty() {
        RuleConditions::catch_all()
    } else {
        seed.conditions.iter().fold(RuleConditions::default(), |conditions, (key, values)| {
            let values: Vec<String> = values.iter().map(|value| value.to_string()).collect();
            conditions.with(*key, ConditionValue::OneOf(values))
        })
    };

    RoutingRule {
        id: RuleId(seed.id.to_string()),
        name: seed.name.to_string(),
        priority: seed.priority,
        active: true,
        conditions,
        target: TargetStrategy::Pool(TargetCriteria {
            specializations: seed.specializations.iter().map(|value| value.to_string()).collect(),
            requires_certification: seed.requires_certification,
            region: None,
            min_experience_years: None,
            max_active_requests: seed.max_active_requests,
        }),
        created_at: seeded_at,
        updated_at: seeded_at,
    }
}

#[derive(Debug, Clone)]
pub struct SeedResult {
    pub providers_seeded: Vec<&'static str>,
    pub rules_seeded: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use caseflow_core::domain::routing::RuleDraft;
    use caseflow_core::routing::validate_draft;

    use super::{routing_rule, seeded_at, DemoDataset, SEED_RULES};
    use crate::repositories::test_support::setup_pool;

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = setup_pool().await;

        let first = DemoDataset::load(&pool).await.expect("first load");
        DemoDataset::load(&pool).await.expect("second load");
        let verification = DemoDataset::verify(&pool).await.expect("verify");

        assert_eq!(first.providers_seeded.len(), 4);
        assert_eq!(first.rules_seeded.len(), 3);
        assert!(verification.all_present, "failed checks: {:?}", verification.checks);

        DemoDataset::clean(&pool).await.expect("clean");
        let after_clean = DemoDataset::verify(&pool).await.expect("verify");
        assert!(after_clean.checks.iter().all(|(_, present)| !present));
        pool.close().await;
    }

    #[test]
    fn seed_rules_pass_catalog_validation() {
        let at = seeded_at().expect("seed timestamp");
        for seed in SEED_RULES {
            let rule = routing_rule(seed, at);
            let draft = RuleDraft {
                name: rule.name,
                priority: rule.priority,
                active: rule.active,
                conditions: rule.conditions,
                target: rule.target,
            };
            assert!(validate_draft(&draft).is_ok(), "seed rule {} is invalid", seed.id);
        }
    }
}
