//! # Workflow Store
//!
//! Narrow persistence contract for tasks, processes and the correction ledger.
//!
//! All writes go through [`WorkflowStore::commit`], which applies a [`UnitOfWork`]
//! all-or-nothing: task updates (compare-and-swap on the expected prior status), comment
//! appends, comment resolutions, process completion and property overrides. This is what makes
//! a comment and its transition land together, and what keeps a CLOSE and the opening of the
//! next task indivisible.

pub mod errors;
pub mod in_memory;
pub mod postgres;

use crate::models::{CorrectionComment, NewComment, Process, Task};
use crate::state_machine::TaskStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

pub use errors::{StoreError, StoreResult};
pub use in_memory::InMemoryWorkflowStore;
pub use postgres::PgWorkflowStore;

/// A task write, optionally guarded by the status the writer observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub expected_status: Option<TaskStatus>,
    pub task: Task,
}

/// Resolution of one ERROR comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentResolution {
    pub comment_id: i64,
    pub resolved_at: DateTime<Utc>,
}

/// Process property overrides carried by a ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyOverrides {
    pub process_id: i64,
    pub properties: BTreeMap<String, String>,
}

/// Completion marker for a process whose last task was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessCompletion {
    pub process_id: i64,
    pub completed_at: DateTime<Utc>,
}

/// A set of writes applied atomically by [`WorkflowStore::commit`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    pub task_updates: Vec<TaskUpdate>,
    pub new_comments: Vec<NewComment>,
    pub resolutions: Vec<CommentResolution>,
    pub completed_process: Option<ProcessCompletion>,
    pub property_overrides: Option<PropertyOverrides>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a guarded write of `task`, failing at commit time if the stored status moved
    pub fn update_task(&mut self, expected_status: TaskStatus, task: Task) -> &mut Self {
        self.task_updates.push(TaskUpdate {
            expected_status: Some(expected_status),
            task,
        });
        self
    }

    pub fn save_task(&mut self, task: Task) -> &mut Self {
        self.task_updates.push(TaskUpdate {
            expected_status: None,
            task,
        });
        self
    }

    pub fn append_comment(&mut self, comment: NewComment) -> &mut Self {
        self.new_comments.push(comment);
        self
    }

    pub fn resolve_comment(&mut self, comment_id: i64, resolved_at: DateTime<Utc>) -> &mut Self {
        self.resolutions.push(CommentResolution {
            comment_id,
            resolved_at,
        });
        self
    }

    pub fn complete_process(&mut self, process_id: i64, completed_at: DateTime<Utc>) -> &mut Self {
        self.completed_process = Some(ProcessCompletion {
            process_id,
            completed_at,
        });
        self
    }

    pub fn override_properties(
        &mut self,
        process_id: i64,
        properties: BTreeMap<String, String>,
    ) -> &mut Self {
        if !properties.is_empty() {
            self.property_overrides = Some(PropertyOverrides {
                process_id,
                properties,
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.task_updates.is_empty()
            && self.new_comments.is_empty()
            && self.resolutions.is_empty()
            && self.completed_process.is_none()
            && self.property_overrides.is_none()
    }

    /// Identifiers of every task written by this unit of work, in write order
    pub fn touched_task_ids(&self) -> Vec<i64> {
        self.task_updates.iter().map(|u| u.task.task_id).collect()
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Identifiers assigned to `new_comments`, in the same order
    pub comment_ids: Vec<i64>,
}

/// Task/process store contract
///
/// Implementations must provide at least read-committed isolation and must apply a
/// [`UnitOfWork`] atomically.
#[async_trait]
pub trait WorkflowStore: Send + Sync + Debug {
    async fn get_task_by_id(&self, task_id: i64) -> StoreResult<Option<Task>>;

    async fn get_process_by_id(&self, process_id: i64) -> StoreResult<Option<Process>>;

    /// All tasks of a process ordered by ordinal
    async fn get_tasks_for_process(&self, process_id: i64) -> StoreResult<Vec<Task>>;

    /// The task with the smallest ordinal greater than `after_ordinal`
    async fn get_next_ordinal_task(
        &self,
        process_id: i64,
        after_ordinal: i32,
    ) -> StoreResult<Option<Task>>;

    /// Ledger entries attached to a task, oldest first
    async fn get_comments_for_task(&self, task_id: i64) -> StoreResult<Vec<CorrectionComment>>;

    async fn get_comment_by_id(&self, comment_id: i64) -> StoreResult<Option<CorrectionComment>>;

    async fn commit(&self, work: UnitOfWork) -> StoreResult<CommitReceipt>;

    /// Unconditional single-task write
    async fn save_task(&self, task: Task) -> StoreResult<()> {
        let mut work = UnitOfWork::new();
        work.save_task(task);
        self.commit(work).await.map(|_| ())
    }

    async fn mark_process_complete(&self, process_id: i64) -> StoreResult<()> {
        let mut work = UnitOfWork::new();
        work.complete_process(process_id, Utc::now());
        self.commit(work).await.map(|_| ())
    }
}

/// Bound a store call by `limit`, failing with [`StoreError::Timeout`] when it elapses
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::timeout(operation, limit.as_millis() as u64)),
    }
}
