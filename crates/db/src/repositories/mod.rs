//! SQLite adapters for the routing core ports.
//!
//! Queries return [`RepositoryError`]; each port impl maps it into the
//! core's `PortError` at the boundary.

use chrono::{DateTime, SecondsFormat, Utc};
use caseflow_core::domain::request::RequestStatus;
use caseflow_core::lifecycle::is_terminal;
use caseflow_core::ports::PortError;
use thiserror::Error;

pub mod assignment_log;
pub mod provider;
pub mod request;
pub mod rule;

pub use assignment_log::SqlAssignmentLog;
pub use provider::SqlProviderDirectory;
pub use request::SqlRequestRepository;
pub use rule::SqlRoutingRuleStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl From<RepositoryError> for PortError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::PoolTimedOut) => {
                PortError::Unavailable("database pool timed out".to_string())
            }
            RepositoryError::Database(error) => PortError::Storage(error.to_string()),
            RepositoryError::Decode(message) => PortError::Decode(message),
            RepositoryError::Encode(message) => PortError::Storage(message),
        }
    }
}

/// Fixed-width UTC text so that stored timestamps compare lexicographically.
pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

/// `('completed', 'cancelled', 'closed')`, built from the lifecycle table.
pub(crate) fn terminal_status_list() -> String {
    let quoted: Vec<String> = RequestStatus::ALL
        .into_iter()
        .filter(|status| is_terminal(*status))
        .map(|status| format!("'{}'", status.as_str()))
        .collect();
    format!("({})", quoted.join(", "))
}
