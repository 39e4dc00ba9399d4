use thiserror::Error;

/// Rejections raised while reading a ticket, before any task is looked up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    #[error("Missing mandatory field '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Unknown action '{value}'")]
    UnknownAction { value: String },
}

impl TicketError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_action(value: impl Into<String>) -> Self {
        Self::UnknownAction {
            value: value.into(),
        }
    }
}

pub type TicketResult<T> = Result<T, TicketError>;
