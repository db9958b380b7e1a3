use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Captured outcome of an operation whose failure must not reach the
/// caller's control flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum BestEffort<T> {
    Completed(T),
    Failed { operation: String, message: String },
}

impl<T> BestEffort<T> {
    /// Awaits `operation` and folds any error into [`BestEffort::Failed`],
    /// logging it under `operation`.
    pub async fn run<F, E>(operation: &str, future: F) -> Self
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match future.await {
            Ok(value) => Self::Completed(value),
            Err(error) => {
                warn!(
                    event_name = "best_effort.failed",
                    operation,
                    error = %error,
                    "best-effort operation failed"
                );
                Self::Failed { operation: operation.to_string(), message: error.to_string() }
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
