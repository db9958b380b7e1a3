use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

/// Point-in-time view of an assignable provider user.
///
/// `active_request_count` is computed by the data source at fetch time and is
/// never carried across assignment attempts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    pub provider_id: ProviderId,
    pub organization_id: OrganizationId,
    pub specializations: Vec<String>,
    pub certified: bool,
    pub experience_years: u32,
    pub rating: Option<Decimal>,
    pub region: Option<String>,
    pub active_request_count: u32,
    pub completed_today_count: u32,
    pub is_active: bool,
    pub can_accept_requests: bool,
    pub organization_approved: bool,
}

impl ProviderCandidate {
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.can_accept_requests && self.organization_approved
    }

    pub fn has_specialization(&self, specialization: &str) -> bool {
        let wanted = specialization.trim();
        self.specializations.iter().any(|owned| owned.trim().eq_ignore_ascii_case(wanted))
    }
}

/// Stored provider record. Workload counts are not part of it; they are
/// derived from requests whenever a candidate is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub provider_id: ProviderId,
    pub organization_id: OrganizationId,
    pub display_name: String,
    pub specializations: Vec<String>,
    pub certified: bool,
    pub experience_years: u32,
    pub rating: Option<Decimal>,
    pub region: Option<String>,
    pub is_active: bool,
    pub can_accept_requests: bool,
    pub organization_approved: bool,
}

impl ProviderProfile {
    pub fn to_candidate(
        &self,
        active_request_count: u32,
        completed_today_count: u32,
    ) -> ProviderCandidate {
        ProviderCandidate {
            provider_id: self.provider_id.clone(),
            organization_id: self.organization_id.clone(),
            specializations: self.specializations.clone(),
            certified: self.certified,
            experience_years: self.experience_years,
            rating: self.rating,
            region: self.region.clone(),
            active_request_count,
            completed_today_count,
            is_active: self.is_active,
            can_accept_requests: self.can_accept_requests,
            organization_approved: self.organization_approved,
        }
    }

    pub fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_id: self.provider_id.clone(),
            organization_id: self.organization_id.clone(),
            display_name: self.display_name.clone(),
            is_active: self.is_active,
            can_accept_requests: self.can_accept_requests,
            organization_approved: self.organization_approved,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider_id: ProviderId,
    pub organization_id: OrganizationId,
    pub display_name: String,
    pub is_active: bool,
    pub can_accept_requests: bool,
    pub organization_approved: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderValidation {
    pub valid: bool,
    pub provider: Option<ProviderInfo>,
    pub reason: Option<String>,
}

impl ProviderValidation {
    pub fn accept(provider: ProviderInfo) -> Self {
        Self { valid: true, provider: Some(provider), reason: None }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self { valid: false, provider: None, reason: Some(reason.into()) }
    }

    /// Applies the eligibility rule shared with the candidate pool.
    pub fn from_info(provider: ProviderInfo) -> Self {
        if !provider.is_active {
            return Self::reject(format!("provider `{}` is not active", provider.provider_id.0));
        }
        if !provider.organization_approved {
            return Self::reject(format!(
                "provider `{}` belongs to an organization that is not approved",
                provider.provider_id.0
            ));
        }
        if !provider.can_accept_requests {
            return Self::reject(format!(
                "provider `{}` is not accepting requests",
                provider.provider_id.0
            ));
        }
        Self::accept(provider)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderWorkload {
    pub provider_id: ProviderId,
    pub active_request_count: u32,
    pub completed_today_count: u32,
}

#[cfg(test)]
mod tests {
    use super::{OrganizationId, ProviderId, ProviderInfo, ProviderValidation};

    fn info() -> ProviderInfo {
        ProviderInfo {
            provider_id: ProviderId("P-1".to_string()),
            organization_id: OrganizationId("ORG-1".to_string()),
            display_name: "Dana Counsel".to_string(),
            is_active: true,
            can_accept_requests: true,
            organization_approved: true,
        }
    }

    #[test]
    fn validation_accepts_fully_eligible_provider() {
        let validation = ProviderValidation::from_info(info());
        assert!(validation.valid);
        assert!(validation.reason.is_none());
    }

    #[test]
    fn profile_builds_candidate_with_supplied_counts() {
        let profile = super::ProviderProfile {
            provider_id: ProviderId("P-1".to_string()),
            organization_id: OrganizationId("ORG-1".to_string()),
            display_name: "Dana Counsel".to_string(),
            specializations: vec!["Tax".to_string()],
            certified: true,
            experience_years: 7,
            rating: None,
            region: Some("north".to_string()),
            is_active: true,
            can_accept_requests: true,
            organization_approved: true,
        };

        let candidate = profile.to_candidate(3, 1);
        assert_eq!(candidate.active_request_count, 3);
        assert_eq!(candidate.completed_today_count, 1);
        assert!(candidate.is_eligible());
        assert!(candidate.has_specialization(" tax "));
        assert_eq!(profile.info(), info());
    }

    #[test]
    fn validation_rejects_each_eligibility_gap() {
        let mut inactive = info();
        inactive.is_active = false;
        let mut unapproved = info();
        unapproved.organization_approved = false;
        let mut full = info();
        full.can_accept_requests = false;

        for provider in [inactive, unapproved, full] {
            let validation = ProviderValidation::from_info(provider);
            assert!(!validation.valid);
            assert!(validation.reason.is_some());
        }
    }
}
