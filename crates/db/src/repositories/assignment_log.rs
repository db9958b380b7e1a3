use caseflow_core::domain::assignment::{
    AssignmentFailureReason, AssignmentKind, AssignmentRecord,
};
use caseflow_core::domain::provider::ProviderId;
use caseflow_core::domain::request::RequestId;
use caseflow_core::domain::routing::RuleId;
use caseflow_core::ports::{AssignmentLog, PortError};
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_timestamp, timestamp, RepositoryError};
use crate::DbPool;

/// Append-only assignment history. Rows come back in insertion order.
pub struct SqlAssignmentLog {
    pool: DbPool,
}

impl SqlAssignmentLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn append_row(&self, record: &AssignmentRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO assignment_log (
                id,
                request_id,
                kind,
                success,
                provider_id,
                rule_id,
                reason,
                note,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.request_id.0)
        .bind(record.kind.as_str())
        .bind(record.success)
        .bind(record.provider_id.as_ref().map(|provider| provider.0.as_str()))
        .bind(record.rule_id.as_ref().map(|rule| rule.0.as_str()))
        .bind(record.reason.map(|reason| reason.as_str()))
        .bind(record.note.as_deref())
        .bind(timestamp(record.occurred_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn all(&self) -> Result<Vec<AssignmentRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, kind, success, provider_id, rule_id, reason, note, occurred_at
             FROM assignment_log
             ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

#[async_trait::async_trait]
impl AssignmentLog for SqlAssignmentLog {
    async fn append(&self, record: AssignmentRecord) -> Result<(), PortError> {
        Ok(self.append_row(&record).await?)
    }

    async fn list(&self) -> Result<Vec<AssignmentRecord>, PortError> {
        Ok(self.all().await?)
    }
}

fn record_from_row(row: SqliteRow) -> Result<AssignmentRecord, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = AssignmentKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown assignment kind `{kind_raw}`")))?;

    let reason = row
        .try_get::<Option<String>, _>("reason")?
        .map(|value| {
            AssignmentFailureReason::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown failure reason `{value}`")))
        })
        .transpose()?;

    Ok(AssignmentRecord {
        id: row.try_get("id")?,
        request_id: RequestId(row.try_get("request_id")?),
        kind,
        success: row.try_get("success")?,
        provider_id: row.try_get::<Option<String>, _>("provider_id")?.map(ProviderId),
        rule_id: row.try_get::<Option<String>, _>("rule_id")?.map(RuleId),
        reason,
        note: row.try_get("note")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}
