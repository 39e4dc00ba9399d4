//! Per-process transition locks.
//!
//! Every read-check-write sequence against a process runs under that process's async mutex,
//! so two tickets on the same process are serialized while different processes run in
//! parallel. Entries are dropped again once nobody holds or waits for them.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct TransitionLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl TransitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `process_id`
    pub async fn acquire(&self, process_id: i64) -> ProcessLockGuard {
        let mutex = self
            .locks
            .entry(process_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        ProcessLockGuard {
            process_id,
            locks: Arc::clone(&self.locks),
            _guard: Some(guard),
        }
    }

    /// Number of processes with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one process, released on drop
#[derive(Debug)]
pub struct ProcessLockGuard {
    process_id: i64,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl ProcessLockGuard {
    pub fn process_id(&self) -> i64 {
        self.process_id
    }
}

impl Drop for ProcessLockGuard {
    fn drop(&mut self) {
        // release first so the map entry is only referenced by the map and by waiters
        self._guard.take();
        self.locks
            .remove_if(&self.process_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
