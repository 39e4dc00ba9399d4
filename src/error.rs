use crate::config::ConfigurationError;
use crate::ledger::LedgerError;
use crate::messaging::{MessagingError, ReportLevel};
use crate::state_machine::{StateMachineError, TaskAction};
use crate::store::StoreError;
use crate::ticket::TicketError;
use std::fmt;
use thiserror::Error;

/// Crate-level error returned to synchronous callers
#[derive(Error, Debug)]
pub enum TasklineError {
    #[error(transparent)]
    Ticket(#[from] TicketError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: i64 },

    #[error("{login} is not allowed to {action} task {task_id}")]
    UnauthorizedAction {
        login: String,
        action: TaskAction,
        task_id: i64,
    },
}

/// Error taxonomy shared by typed results and outcome reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingField,
    InvalidField,
    UnknownAction,
    TaskNotFound,
    IllegalStateTransition,
    InvalidCorrectionTask,
    AlreadyResolved,
    UnauthorizedAction,
    Persistence,
    Timeout,
    Messaging,
    Configuration,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "MissingField",
            Self::InvalidField => "InvalidField",
            Self::UnknownAction => "UnknownAction",
            Self::TaskNotFound => "TaskNotFound",
            Self::IllegalStateTransition => "IllegalStateTransition",
            Self::InvalidCorrectionTask => "InvalidCorrectionTask",
            Self::AlreadyResolved => "AlreadyResolved",
            Self::UnauthorizedAction => "UnauthorizedAction",
            Self::Persistence => "Persistence",
            Self::Timeout => "Timeout",
            Self::Messaging => "Messaging",
            Self::Configuration => "Configuration",
            Self::Internal => "Internal",
        }
    }

    /// Infrastructure failures, as opposed to rejected input or domain rules
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Persistence | Self::Timeout | Self::Messaging | Self::Configuration | Self::Internal
        )
    }

    pub fn report_level(&self) -> ReportLevel {
        if self.is_infrastructure() {
            ReportLevel::Fatal
        } else {
            ReportLevel::Error
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn ticket_kind(error: &TicketError) -> ErrorKind {
    match error {
        TicketError::MissingField { .. } => ErrorKind::MissingField,
        TicketError::InvalidField { .. } => ErrorKind::InvalidField,
        TicketError::UnknownAction { .. } => ErrorKind::UnknownAction,
    }
}

fn store_kind(error: &StoreError) -> ErrorKind {
    match error {
        StoreError::Timeout { .. } => ErrorKind::Timeout,
        StoreError::AlreadyResolved { .. } => ErrorKind::AlreadyResolved,
        _ => ErrorKind::Persistence,
    }
}

fn ledger_kind(error: &LedgerError) -> ErrorKind {
    match error {
        LedgerError::AlreadyResolved { .. } => ErrorKind::AlreadyResolved,
        LedgerError::CommentNotFound { .. } | LedgerError::NotAnError { .. } => {
            ErrorKind::Internal
        }
        LedgerError::Store(e) => store_kind(e),
    }
}

impl TasklineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ticket(e) => ticket_kind(e),
            Self::StateMachine(e) => match e {
                StateMachineError::IllegalStateTransition { .. } => {
                    ErrorKind::IllegalStateTransition
                }
                StateMachineError::InvalidCorrectionTask { .. } => {
                    ErrorKind::InvalidCorrectionTask
                }
                StateMachineError::TaskNotFound { .. } => ErrorKind::TaskNotFound,
                StateMachineError::InvalidTicket(e) => ticket_kind(e),
                StateMachineError::Ledger(e) => ledger_kind(e),
                StateMachineError::Store(e) => store_kind(e),
            },
            Self::Ledger(e) => ledger_kind(e),
            Self::Store(e) => store_kind(e),
            Self::Messaging(_) => ErrorKind::Messaging,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::TaskNotFound { .. } => ErrorKind::TaskNotFound,
            Self::UnauthorizedAction { .. } => ErrorKind::UnauthorizedAction,
        }
    }

    pub fn report_level(&self) -> ReportLevel {
        self.kind().report_level()
    }

    /// Whether leaving the ticket to the transport's redelivery may succeed
    pub fn is_retryable(&self) -> bool {
        let store = match self {
            Self::Store(e) => Some(e),
            Self::StateMachine(StateMachineError::Store(e)) => Some(e),
            Self::StateMachine(StateMachineError::Ledger(LedgerError::Store(e))) => Some(e),
            Self::Ledger(LedgerError::Store(e)) => Some(e),
            Self::Messaging(_) => return true,
            _ => None,
        };
        store.is_some_and(StoreError::is_transient)
    }

    /// Text used in outcome reports
    pub fn report_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

pub type Result<T> = std::result::Result<T, TasklineError>;
