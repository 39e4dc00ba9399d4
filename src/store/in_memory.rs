//! # In-Memory Workflow Store
//!
//! Thread-safe store used for tests and embedded deployments.
//!
//! - **Atomic commits**: a unit of work is fully validated under the write lock before any of
//!   it is applied, so a rejected commit leaves no trace.
//! - **Failure injection**: `fail_next_commit` and `with_latency` simulate database outages and
//!   slow stores.

use super::{CommitReceipt, StoreError, StoreResult, UnitOfWork, WorkflowStore};
use crate::models::{CommentKind, CorrectionComment, Process, Task};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct StoreState {
    processes: HashMap<i64, Process>,
    tasks: HashMap<i64, Task>,
    comments: BTreeMap<i64, CorrectionComment>,
    next_comment_id: i64,
}

#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<StoreState>,
    fail_next_commit: AtomicBool,
    latency: Option<Duration>,
    commit_count: AtomicU64,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every store call, used to exercise store timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed a process together with its task sequence
    pub fn insert_process(&self, process: Process, tasks: Vec<Task>) {
        let mut state = self.state.write();
        for task in tasks {
            state.tasks.insert(task.task_id, task);
        }
        state.processes.insert(process.process_id, process);
    }

    pub fn insert_task(&self, task: Task) {
        self.state.write().tasks.insert(task.task_id, task);
    }

    /// Make the next commit fail with a database error without applying anything
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn task(&self, task_id: i64) -> Option<Task> {
        self.state.read().tasks.get(&task_id).cloned()
    }

    pub fn process(&self, process_id: i64) -> Option<Process> {
        self.state.read().processes.get(&process_id).cloned()
    }

    pub fn comments_for_task(&self, task_id: i64) -> Vec<CorrectionComment> {
        self.state
            .read()
            .comments
            .values()
            .filter(|c| c.current_task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn comment_count(&self) -> usize {
        self.state.read().comments.len()
    }

    /// Number of successfully applied commits
    pub fn commit_count(&self) -> u64 {
        self.commit_count.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn validate(state: &StoreState, work: &UnitOfWork) -> StoreResult<()> {
        for update in &work.task_updates {
            let stored = state
                .tasks
                .get(&update.task.task_id)
                .ok_or_else(|| StoreError::not_found("task", update.task.task_id))?;
            if let Some(expected) = update.expected_status {
                if stored.status != expected {
                    return Err(StoreError::ConcurrentModification {
                        task_id: stored.task_id,
                        expected,
                        actual: stored.status,
                    });
                }
            }
        }

        for comment in &work.new_comments {
            if !state.tasks.contains_key(&comment.current_task_id) {
                return Err(StoreError::not_found("task", comment.current_task_id));
            }
        }

        let mut seen = HashSet::new();
        for resolution in &work.resolutions {
            let stored = state
                .comments
                .get(&resolution.comment_id)
                .ok_or_else(|| StoreError::not_found("comment", resolution.comment_id))?;
            if stored.kind != CommentKind::Error {
                return Err(StoreError::invalid_data(format!(
                    "comment {} is not an error comment",
                    stored.comment_id
                )));
            }
            if stored.resolved || !seen.insert(resolution.comment_id) {
                return Err(StoreError::AlreadyResolved {
                    comment_id: resolution.comment_id,
                });
            }
        }

        if let Some(completion) = &work.completed_process {
            if !state.processes.contains_key(&completion.process_id) {
                return Err(StoreError::not_found("process", completion.process_id));
            }
        }
        if let Some(overrides) = &work.property_overrides {
            if !state.processes.contains_key(&overrides.process_id) {
                return Err(StoreError::not_found("process", overrides.process_id));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get_task_by_id(&self, task_id: i64) -> StoreResult<Option<Task>> {
        self.simulate_latency().await;
        Ok(self.task(task_id))
    }

    async fn get_process_by_id(&self, process_id: i64) -> StoreResult<Option<Process>> {
        self.simulate_latency().await;
        Ok(self.process(process_id))
    }

    async fn get_tasks_for_process(&self, process_id: i64) -> StoreResult<Vec<Task>> {
        self.simulate_latency().await;
        let state = self.state.read();
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.process_id == process_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.ordinal);
        Ok(tasks)
    }

    async fn get_next_ordinal_task(
        &self,
        process_id: i64,
        after_ordinal: i32,
    ) -> StoreResult<Option<Task>> {
        self.simulate_latency().await;
        let state = self.state.read();
        Ok(state
            .tasks
            .values()
            .filter(|t| t.process_id == process_id && t.ordinal > after_ordinal)
            .min_by_key(|t| t.ordinal)
            .cloned())
    }

    async fn get_comments_for_task(&self, task_id: i64) -> StoreResult<Vec<CorrectionComment>> {
        self.simulate_latency().await;
        Ok(self.comments_for_task(task_id))
    }

    async fn get_comment_by_id(&self, comment_id: i64) -> StoreResult<Option<CorrectionComment>> {
        self.simulate_latency().await;
        Ok(self.state.read().comments.get(&comment_id).cloned())
    }

    async fn commit(&self, work: UnitOfWork) -> StoreResult<CommitReceipt> {
        self.simulate_latency().await;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }

        let mut state = self.state.write();
        Self::validate(&state, &work)?;

        for update in work.task_updates {
            state.tasks.insert(update.task.task_id, update.task);
        }

        let mut comment_ids = Vec::with_capacity(work.new_comments.len());
        for comment in work.new_comments {
            state.next_comment_id += 1;
            let comment_id = state.next_comment_id;
            state
                .comments
                .insert(comment_id, comment.into_stored(comment_id));
            comment_ids.push(comment_id);
        }

        for resolution in work.resolutions {
            if let Some(comment) = state.comments.get_mut(&resolution.comment_id) {
                comment.resolved = true;
                comment.resolved_at = Some(resolution.resolved_at);
            }
        }

        if let Some(completion) = work.completed_process {
            if let Some(process) = state.processes.get_mut(&completion.process_id) {
                process.completed = true;
                process.completed_at = Some(completion.completed_at);
            }
        }

        if let Some(overrides) = work.property_overrides {
            if let Some(process) = state.processes.get_mut(&overrides.process_id) {
                process.properties.extend(overrides.properties);
            }
        }

        self.commit_count.fetch_add(1, Ordering::SeqCst);
        Ok(CommitReceipt { comment_ids })
    }
}
