//! # Store Error Types
//!
//! Failures of the task/process store, kept separate from domain errors so callers can tell a
//! stale instruction from an infrastructure problem.

use crate::state_machine::TaskStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Concurrent modification of task {task_id}: expected {expected}, found {actual}")]
    ConcurrentModification {
        task_id: i64,
        expected: TaskStatus,
        actual: TaskStatus,
    },

    #[error("Comment {comment_id} is already resolved")]
    AlreadyResolved { comment_id: i64 },

    #[error("Store operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Invalid stored data: {reason}")]
    InvalidData { reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid_data(reason: impl Into<String>) -> Self {
        Self::InvalidData {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Infrastructure failures that a redelivery may get past
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Database(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
