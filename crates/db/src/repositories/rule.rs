use caseflow_core::domain::routing::{RoutingRule, RuleConditions, RuleId, TargetStrategy};
use caseflow_core::ports::{PortError, RoutingRuleStore};
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_timestamp, timestamp, RepositoryError};
use crate::DbPool;

const RULE_COLUMNS: &str = "id,
    name,
    priority,
    active,
    conditions_json,
    target_json,
    created_at,
    updated_at";

pub struct SqlRoutingRuleStore {
    pool: DbPool,
}

impl SqlRoutingRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn all(&self) -> Result<Vec<RoutingRule>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM routing_rule ORDER BY priority ASC, created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn fetch(&self, id: &RuleId) -> Result<Option<RoutingRule>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM routing_rule WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(rule_from_row).transpose()
    }

    pub(crate) async fn insert_row(&self, rule: &RoutingRule) -> Result<(), RepositoryError> {
        let (conditions, target) = encode_rule(rule)?;

        sqlx::query(
            "INSERT INTO routing_rule (
                id,
                name,
                priority,
                active,
                conditions_json,
                target_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(rule.priority)
        .bind(rule.active)
        .bind(conditions)
        .bind(target)
        .bind(timestamp(rule.created_at))
        .bind(timestamp(rule.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub(crate) async fn replace_row(&self, rule: &RoutingRule) -> Result<bool, RepositoryError> {
        let (conditions, target) = encode_rule(rule)?;

        let result = sqlx::query(
            "UPDATE routing_rule
             SET name = ?,
                 priority = ?,
                 active = ?,
                 conditions_json = ?,
                 target_json = ?,
                 created_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&rule.name)
        .bind(rule.priority)
        .bind(rule.active)
        .bind(conditions)
        .bind(target)
        .bind(timestamp(rule.created_at))
        .bind(timestamp(rule.updated_at))
        .bind(&rule.id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_row(&self, id: &RuleId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM routing_rule WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl RoutingRuleStore for SqlRoutingRuleStore {
    async fn list(&self) -> Result<Vec<RoutingRule>, PortError> {
        Ok(self.all().await?)
    }

    async fn get(&self, id: &RuleId) -> Result<Option<RoutingRule>, PortError> {
        Ok(self.fetch(id).await?)
    }

    async fn insert(&self, rule: RoutingRule) -> Result<(), PortError> {
        Ok(self.insert_row(&rule).await?)
    }

    async fn replace(&self, rule: RoutingRule) -> Result<bool, PortError> {
        Ok(self.replace_row(&rule).await?)
    }

    async fn remove(&self, id: &RuleId) -> Result<bool, PortError> {
        Ok(self.delete_row(id).await?)
    }
}

fn encode_rule(rule: &RoutingRule) -> Result<(String, String), RepositoryError> {
    let conditions = rule
        .conditions
        .to_storage()
        .map_err(|error| RepositoryError::Encode(format!("rule conditions: {error}")))?;
    let target = rule
        .target
        .to_storage()
        .map_err(|error| RepositoryError::Encode(format!("rule target: {error}")))?;
    Ok((conditions, target))
}

fn rule_from_row(row: SqliteRow) -> Result<RoutingRule, RepositoryError> {
    let conditions_raw = row.try_get::<String, _>("conditions_json")?;
    let conditions = RuleConditions::from_storage(&conditions_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid conditions_json: {error}")))?;

    let target_raw = row.try_get::<String, _>("target_json")?;
    let target = TargetStrategy::from_storage(&target_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid target_json: {error}")))?;

    Ok(RoutingRule {
        id: RuleId(row.try_get("id")?),
        name: row.try_get("name")?,
        priority: row.try_get("priority")?,
        active: row.try_get("active")?,
        conditions,
        target,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
