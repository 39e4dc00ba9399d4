//! Best-effort search index updates after a committed transition.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index unavailable: {reason}")]
    Unavailable { reason: String },
}

#[async_trait]
pub trait IndexSink: Send + Sync + Debug {
    async fn reindex_task(&self, task_id: i64) -> Result<(), IndexError>;

    async fn reindex_process(&self, process_id: i64) -> Result<(), IndexError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndexSink;

#[async_trait]
impl IndexSink for NoopIndexSink {
    async fn reindex_task(&self, _task_id: i64) -> Result<(), IndexError> {
        Ok(())
    }

    async fn reindex_process(&self, _process_id: i64) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Records reindex requests; used in tests
#[derive(Debug, Default)]
pub struct RecordingIndexSink {
    tasks: Mutex<Vec<i64>>,
    processes: Mutex<Vec<i64>>,
    failing: AtomicBool,
}

impl RecordingIndexSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reindexed_tasks(&self) -> Vec<i64> {
        self.tasks.lock().clone()
    }

    pub fn reindexed_processes(&self) -> Vec<i64> {
        self.processes.lock().clone()
    }

    fn check(&self) -> Result<(), IndexError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable {
                reason: "index offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IndexSink for RecordingIndexSink {
    async fn reindex_task(&self, task_id: i64) -> Result<(), IndexError> {
        self.check()?;
        self.tasks.lock().push(task_id);
        Ok(())
    }

    async fn reindex_process(&self, process_id: i64) -> Result<(), IndexError> {
        self.check()?;
        self.processes.lock().push(process_id);
        Ok(())
    }
}
