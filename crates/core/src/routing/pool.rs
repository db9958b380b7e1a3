use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::provider::ProviderCandidate;
use crate::domain::routing::TargetStrategy;
use crate::ports::{PortError, ProviderDataSource};

pub struct ProviderCandidatePool {
    source: Arc<dyn ProviderDataSource>,
}

impl ProviderCandidatePool {
    pub fn new(source: Arc<dyn ProviderDataSource>) -> Self {
        Self { source }
    }

    /// Eligible providers admitted by `target`. Counts are fetched fresh on
    /// every call. An empty result is not an error.
    pub async fn available_candidates(
        &self,
        target: &TargetStrategy,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<ProviderCandidate>, PortError> {
        let fetched = self.source.list_eligible_providers(day_start).await?;
        let fetched_count = fetched.len();

        let candidates: Vec<ProviderCandidate> = fetched
            .into_iter()
            .filter(ProviderCandidate::is_eligible)
            .filter(|candidate| match target {
                TargetStrategy::Pool(criteria) => criteria.admits(candidate),
                TargetStrategy::SpecificProvider { provider_id } => {
                    &candidate.provider_id == provider_id
                }
            })
            .collect();

        debug!(
            event_name = "routing.pool.filtered",
            fetched = fetched_count,
            admitted = candidates.len(),
            "candidate pool filtered"
        );
        Ok(candidates)
    }
}

/// Best-first ordering: lightest workload, then highest rating (unrated
/// last), then most experience. Stable for full ties.
pub fn rank(mut candidates: Vec<ProviderCandidate>) -> Vec<ProviderCandidate> {
    candidates.sort_by(compare_candidates);
    candidates
}

pub fn compare_candidates(left: &ProviderCandidate, right: &ProviderCandidate) -> Ordering {
    left.active_request_count
        .cmp(&right.active_request_count)
        .then_with(|| right.rating.cmp(&left.rating))
        .then_with(|| right.experience_years.cmp(&left.experience_years))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{rank, ProviderCandidatePool};
    use crate::domain::provider::{OrganizationId, ProviderCandidate, ProviderId};
    use crate::domain::routing::{TargetCriteria, TargetStrategy};
    use crate::ports::{PortError, ProviderDataSource};

    fn candidate(id: &str, active: u32) -> ProviderCandidate {
        ProviderCandidate {
            provider_id: ProviderId(id.to_string()),
            organization_id: OrganizationId("ORG-1".to_string()),
            specializations: vec!["tax".to_string()],
            certified: false,
            experience_years: 5,
            rating: None,
            region: Some("north".to_string()),
            active_request_count: active,
            completed_today_count: 0,
            is_active: true,
            can_accept_requests: true,
            organization_approved: true,
        }
    }

    struct FixedSource(Vec<ProviderCandidate>);

    #[async_trait::async_trait]
    impl ProviderDataSource for FixedSource {
        async fn list_eligible_providers(
            &self,
            _day_start: chrono::DateTime<Utc>,
        ) -> Result<Vec<ProviderCandidate>, PortError> {
            Ok(self.0.clone())
        }

        async fn active_request_count(&self, _provider_id: &ProviderId) -> Result<u32, PortError> {
            Ok(0)
        }

        async fn completed_today_count(
            &self,
            _provider_id: &ProviderId,
            _day_start: chrono::DateTime<Utc>,
        ) -> Result<u32, PortError> {
            Ok(0)
        }
    }

    fn ids(candidates: &[ProviderCandidate]) -> Vec<&str> {
        candidates.iter().map(|candidate| candidate.provider_id.0.as_str()).collect()
    }

    #[test]
    fn lightest_workload_ranks_first() {
        let ranked = rank(vec![candidate("P-3", 3), candidate("P-1", 1), candidate("P-2", 2)]);
        assert_eq!(ids(&ranked), vec!["P-1", "P-2", "P-3"]);
    }

    #[test]
    fn rating_then_experience_break_workload_ties() {
        let mut unrated = candidate("unrated", 1);
        unrated.experience_years = 30;
        let mut good = candidate("good", 1);
        good.rating = Some(Decimal::new(45, 1));
        let mut better = candidate("better", 1);
        better.rating = Some(Decimal::new(48, 1));
        let mut veteran = candidate("veteran", 1);
        veteran.rating = Some(Decimal::new(45, 1));
        veteran.experience_years = 12;

        let ranked = rank(vec![unrated, good, better, veteran]);
        assert_eq!(ids(&ranked), vec!["better", "veteran", "good", "unrated"]);
    }

    #[test]
    fn full_ties_keep_input_order() {
        let ranked = rank(vec![candidate("first", 0), candidate("second", 0)]);
        assert_eq!(ids(&ranked), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn pool_drops_ineligible_and_applies_criteria() {
        let mut inactive = candidate("inactive", 0);
        inactive.is_active = false;
        let mut closed = candidate("closed", 0);
        closed.can_accept_requests = false;
        let mut certified = candidate("certified", 2);
        certified.certified = true;
        let mut southern = candidate("southern", 0);
        southern.region = Some("south".to_string());
        southern.certified = true;
        let mut busy = candidate("busy", 5);
        busy.certified = true;

        let pool = ProviderCandidatePool::new(Arc::new(FixedSource(vec![
            inactive,
            closed,
            certified,
            southern,
            busy,
            candidate("uncertified", 0),
        ])));
        let target = TargetStrategy::Pool(TargetCriteria {
            specializations: vec!["TAX".to_string(), "family".to_string()],
            requires_certification: true,
            region: Some("North".to_string()),
            min_experience_years: Some(3),
            max_active_requests: Some(5),
        });

        let admitted = pool.available_candidates(&target, Utc::now()).await.expect("pool");
        assert_eq!(ids(&admitted), vec!["certified"]);
    }

    #[tokio::test]
    async fn specific_provider_target_keeps_only_that_provider() {
        let pool = ProviderCandidatePool::new(Arc::new(FixedSource(vec![
            candidate("P-1", 0),
            candidate("P-2", 4),
        ])));
        let target = TargetStrategy::SpecificProvider { provider_id: ProviderId("P-2".into()) };

        let admitted = pool.available_candidates(&target, Utc::now()).await.expect("pool");
        assert_eq!(ids(&admitted), vec!["P-2"]);

        let absent = TargetStrategy::SpecificProvider { provider_id: ProviderId("P-9".into()) };
        assert!(pool.available_candidates(&absent, Utc::now()).await.expect("pool").is_empty());
    }
}
