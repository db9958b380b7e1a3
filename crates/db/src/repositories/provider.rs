use std::str::FromStr;

use caseflow_core::domain::provider::{
    OrganizationId, ProviderCandidate, ProviderId, ProviderProfile, ProviderValidation,
};
use caseflow_core::domain::request::RequestStatus;
use caseflow_core::ports::{PortError, ProviderDataSource, ProviderValidator};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_u32, terminal_status_list, timestamp, RepositoryError};
use crate::DbPool;

const PROFILE_COLUMNS: &str = "p.provider_id,
    p.organization_id,
    p.display_name,
    p.specializations_json,
    p.certified,
    p.experience_years,
    p.rating,
    p.region,
    p.is_active,
    p.can_accept_requests,
    p.organization_approved";

/// Provider profiles with workload counts read from `service_request` at
/// query time.
pub struct SqlProviderDirectory {
    pool: DbPool,
}

impl SqlProviderDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, profile: &ProviderProfile) -> Result<(), RepositoryError> {
        let specializations = serde_json::to_string(&profile.specializations)
            .map_err(|error| RepositoryError::Encode(format!("specializations: {error}")))?;

        sqlx::query(
            "INSERT INTO provider_profile (
                provider_id,
                organization_id,
                display_name,
                specializations_json,
                certified,
                experience_years,
                rating,
                region,
                is_active,
                can_accept_requests,
                organization_approved
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(provider_id) DO UPDATE SET
                organization_id = excluded.organization_id,
                display_name = excluded.display_name,
                specializations_json = excluded.specializations_json,
                certified = excluded.certified,
                experience_years = excluded.experience_years,
                rating = excluded.rating,
                region = excluded.region,
                is_active = excluded.is_active,
                can_accept_requests = excluded.can_accept_requests,
                organization_approved = excluded.organization_approved",
        )
        .bind(&profile.provider_id.0)
        .bind(&profile.organization_id.0)
        .bind(&profile.display_name)
        .bind(specializations)
        .bind(profile.certified)
        .bind(i64::from(profile.experience_years))
        .bind(profile.rating.map(|rating| rating.to_string()))
        .bind(profile.region.as_deref())
        .bind(profile.is_active)
        .bind(profile.can_accept_requests)
        .bind(profile.organization_approved)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_profile(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Option<ProviderProfile>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM provider_profile p WHERE p.provider_id = ?"
        ))
        .bind(&provider_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| profile_from_row(&row)).transpose()
    }

    pub async fn list_profiles(&self) -> Result<Vec<ProviderProfile>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM provider_profile p ORDER BY p.provider_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn eligible(
        &self,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<ProviderCandidate>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS},
                (SELECT COUNT(*) FROM service_request r
                  WHERE r.assigned_provider_id = p.provider_id
                    AND r.status NOT IN {terminal}) AS active_request_count,
                (SELECT COUNT(*) FROM service_request r
                  WHERE r.assigned_provider_id = p.provider_id
                    AND r.status = ?
                    AND r.completed_at >= ?) AS completed_today_count
             FROM provider_profile p
             WHERE p.is_active = 1
               AND p.can_accept_requests = 1
               AND p.organization_approved = 1
             ORDER BY p.provider_id ASC",
            terminal = terminal_status_list()
        ))
        .bind(RequestStatus::Completed.as_str())
        .bind(timestamp(day_start))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ProviderCandidate, RepositoryError> {
                let profile = profile_from_row(row)?;
                let active = parse_u32("active_request_count", row.try_get("active_request_count")?)?;
                let completed =
                    parse_u32("completed_today_count", row.try_get("completed_today_count")?)?;
                Ok(profile.to_candidate(active, completed))
            })
            .collect()
    }

    async fn count_active(&self, provider_id: &ProviderId) -> Result<u32, RepositoryError> {
        let count = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM service_request
             WHERE assigned_provider_id = ? AND status NOT IN {}",
            terminal_status_list()
        ))
        .bind(&provider_id.0)
        .fetch_one(&self.pool)
        .await?
        .try_get::<i64, _>("count")?;

        parse_u32("count", count)
    }

    async fn count_completed_since(
        &self,
        provider_id: &ProviderId,
        day_start: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM service_request
             WHERE assigned_provider_id = ? AND status = ? AND completed_at >= ?",
        )
        .bind(&provider_id.0)
        .bind(RequestStatus::Completed.as_str())
        .bind(timestamp(day_start))
        .fetch_one(&self.pool)
        .await?
        .try_get::<i64, _>("count")?;

        parse_u32("count", count)
    }
}

#[async_trait::async_trait]
impl ProviderDataSource for SqlProviderDirectory {
    async fn list_eligible_providers(
        &self,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<ProviderCandidate>, PortError> {
        Ok(self.eligible(day_start).await?)
    }

    async fn active_request_count(&self, provider_id: &ProviderId) -> Result<u32, PortError> {
        Ok(self.count_active(provider_id).await?)
    }

    async fn completed_today_count(
        &self,
        provider_id: &ProviderId,
        day_start: DateTime<Utc>,
    ) -> Result<u32, PortError> {
        Ok(self.count_completed_since(provider_id, day_start).await?)
    }
}

#[async_trait::async_trait]
impl ProviderValidator for SqlProviderDirectory {
    async fn validate(&self, provider_id: &ProviderId) -> Result<ProviderValidation, PortError> {
        Ok(match self.find_profile(provider_id).await? {
            Some(profile) => ProviderValidation::from_info(profile.info()),
            None => {
                ProviderValidation::reject(format!("provider `{}` does not exist", provider_id.0))
            }
        })
    }
}

fn profile_from_row(row: &SqliteRow) -> Result<ProviderProfile, RepositoryError> {
    let specializations_raw = row.try_get::<String, _>("specializations_json")?;
    let specializations = serde_json::from_str::<Vec<String>>(&specializations_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid specializations_json: {error}")))?;

    let rating = row
        .try_get::<Option<String>, _>("rating")?
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|error| RepositoryError::Decode(format!("invalid rating `{raw}`: {error}")))
        })
        .transpose()?;

    Ok(ProviderProfile {
        provider_id: ProviderId(row.try_get("provider_id")?),
        organization_id: OrganizationId(row.try_get("organization_id")?),
        display_name: row.try_get("display_name")?,
        specializations,
        certified: row.try_get("certified")?,
        experience_years: parse_u32("experience_years", row.try_get("experience_years")?)?,
        rating,
        region: row.try_get("region")?,
        is_active: row.try_get("is_active")?,
        can_accept_requests: row.try_get("can_accept_requests")?,
        organization_approved: row.try_get("organization_approved")?,
    })
}
