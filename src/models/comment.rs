//! # Correction Comment Model
//!
//! Entries of the correction ledger. Comments are append-only: the kind never changes and the
//! only mutation ever applied to a stored comment is flipping `resolved` from `false` to `true`
//! on an ERROR comment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommentKind {
    Info,
    Error,
}

impl CommentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Self::Info),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("Invalid comment kind: {s}")),
        }
    }
}

/// A stored ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionComment {
    pub comment_id: i64,
    pub process_id: i64,
    /// Task the comment is attached to
    pub current_task_id: i64,
    pub kind: CommentKind,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    /// Earlier task that has to redo work (ERROR only)
    pub correction_task_id: Option<i64>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl CorrectionComment {
    /// Check whether this is an ERROR comment still waiting for resolution
    pub fn is_open_error(&self) -> bool {
        self.kind == CommentKind::Error && !self.resolved
    }
}

/// A comment that has not been stored yet
///
/// Construct through [`NewComment::info`] or [`NewComment::error`] so that INFO comments can
/// never carry a correction reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub process_id: i64,
    pub current_task_id: i64,
    pub kind: CommentKind,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub correction_task_id: Option<i64>,
}

impl NewComment {
    pub fn info(
        process_id: i64,
        current_task_id: i64,
        message: impl Into<String>,
        author: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            process_id,
            current_task_id,
            kind: CommentKind::Info,
            message: message.into(),
            author: author.into(),
            created_at,
            correction_task_id: None,
        }
    }

    pub fn error(
        process_id: i64,
        current_task_id: i64,
        message: impl Into<String>,
        author: impl Into<String>,
        created_at: DateTime<Utc>,
        correction_task_id: Option<i64>,
    ) -> Self {
        Self {
            process_id,
            current_task_id,
            kind: CommentKind::Error,
            message: message.into(),
            author: author.into(),
            created_at,
            correction_task_id,
        }
    }

    /// Upgrade an informational comment to an error, keeping its text and author
    pub fn into_error(self, correction_task_id: Option<i64>) -> Self {
        Self {
            kind: CommentKind::Error,
            correction_task_id,
            ..self
        }
    }

    /// Materialize the stored form once the store has assigned an identifier
    pub fn into_stored(self, comment_id: i64) -> CorrectionComment {
        CorrectionComment {
            comment_id,
            process_id: self.process_id,
            current_task_id: self.current_task_id,
            kind: self.kind,
            message: self.message,
            author: self.author,
            created_at: self.created_at,
            correction_task_id: self.correction_task_id,
            resolved: false,
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_comment_has_no_correction_reference() {
        let comment = NewComment::info(1, 2, "looks fine", "system", Utc::now());
        assert_eq!(comment.kind, CommentKind::Info);
        assert!(comment.correction_task_id.is_none());
    }

    #[test]
    fn test_upgrade_to_error_keeps_text() {
        let comment = NewComment::info(1, 2, "bad scan", "jdoe", Utc::now()).into_error(Some(1));
        assert_eq!(comment.kind, CommentKind::Error);
        assert_eq!(comment.message, "bad scan");
        assert_eq!(comment.correction_task_id, Some(1));

        let stored = comment.into_stored(99);
        assert_eq!(stored.comment_id, 99);
        assert!(stored.is_open_error());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("ERROR".parse::<CommentKind>().unwrap(), CommentKind::Error);
        assert!("WARN".parse::<CommentKind>().is_err());
    }
}
