//! # Task Model
//!
//! One ordered work step of a process's workflow.
//!
//! ## Database Schema
//!
//! Maps to the `taskline_tasks` table:
//! - `task_id`: Primary key (BIGINT)
//! - `process_id`: Owning process (BIGINT)
//! - `ordinal`: Position within the process (INTEGER, unique per process)
//! - `status`: Processing status value (SMALLINT, see [`TaskStatus::value`])
//! - `edit_type`: Origin of the last transition (VARCHAR)
//! - `user_groups`: Groups allowed to work on the task (TEXT[])
//!
//! Tasks are created in bulk when a process is instantiated and are only ever mutated through
//! the task state machine.

use crate::state_machine::{TaskEditType, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work within a process's ordered task sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: i64,
    pub process_id: i64,
    pub title: String,
    pub ordinal: i32,
    pub status: TaskStatus,
    /// Login of the identity currently (or last) working on the task
    pub processing_user: Option<String>,
    pub processing_begin: Option<DateTime<Utc>>,
    /// Timestamp of the last edit
    pub processing_time: Option<DateTime<Utc>>,
    pub processing_end: Option<DateTime<Utc>>,
    pub edit_type: TaskEditType,
    /// Set while the task is part of a correction loop
    pub correction: bool,
    #[serde(default)]
    pub user_groups: Vec<String>,
}

impl Task {
    /// Create a locked task with no processing history
    pub fn new(task_id: i64, process_id: i64, title: impl Into<String>, ordinal: i32) -> Self {
        Self {
            task_id,
            process_id,
            title: title.into(),
            ordinal,
            status: TaskStatus::Locked,
            processing_user: None,
            processing_begin: None,
            processing_time: None,
            processing_end: None,
            edit_type: TaskEditType::Automatic,
            correction: false,
            user_groups: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_user_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_processing_user(mut self, login: impl Into<String>) -> Self {
        self.processing_user = Some(login.into());
        self
    }

    /// Check whether this task comes before `other` in the same process
    pub fn precedes(&self, other: &Task) -> bool {
        self.process_id == other.process_id && self.ordinal < other.ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_locked_without_history() {
        let task = Task::new(1, 10, "Scanning", 2);
        assert_eq!(task.status, TaskStatus::Locked);
        assert!(task.processing_user.is_none());
        assert!(task.processing_begin.is_none());
        assert!(!task.correction);
        assert!(task.user_groups.is_empty());
    }

    #[test]
    fn test_precedes_requires_same_process() {
        let first = Task::new(1, 10, "Scanning", 1);
        let second = Task::new(2, 10, "QA", 2);
        let foreign = Task::new(3, 11, "QA", 5);

        assert!(first.precedes(&second));
        assert!(!second.precedes(&first));
        assert!(!first.precedes(&foreign));
    }
}
