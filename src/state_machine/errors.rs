use super::events::TaskAction;
use super::states::TaskStatus;
use crate::ledger::LedgerError;
use crate::store::StoreError;
use crate::ticket::TicketError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Action {action} is not allowed on task {task_id} in status {observed}")]
    IllegalStateTransition {
        task_id: i64,
        action: TaskAction,
        observed: TaskStatus,
    },

    #[error("Task {correction_task_id} cannot be used to correct task {task_id}: {reason}")]
    InvalidCorrectionTask {
        task_id: i64,
        correction_task_id: i64,
        reason: String,
    },

    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: i64 },

    #[error("Invalid ticket: {0}")]
    InvalidTicket(#[from] TicketError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl StateMachineError {
    pub fn illegal_transition(task_id: i64, action: TaskAction, observed: TaskStatus) -> Self {
        Self::IllegalStateTransition {
            task_id,
            action,
            observed,
        }
    }

    pub fn invalid_correction_task(
        task_id: i64,
        correction_task_id: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidCorrectionTask {
            task_id,
            correction_task_id,
            reason: reason.into(),
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
