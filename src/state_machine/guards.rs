use super::errors::{StateMachineError, StateMachineResult};
use crate::models::Task;

/// Precondition checked before a transition is planned
pub trait StateGuard<T> {
    fn check(&self, entity: &T) -> StateMachineResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// A correction task must be an earlier task of the same process
#[derive(Debug, Clone, Copy)]
pub struct CorrectionTaskGuard<'a> {
    current: &'a Task,
}

impl<'a> CorrectionTaskGuard<'a> {
    pub fn new(current: &'a Task) -> Self {
        Self { current }
    }
}

impl StateGuard<Task> for CorrectionTaskGuard<'_> {
    fn check(&self, candidate: &Task) -> StateMachineResult<()> {
        let reason = if candidate.task_id == self.current.task_id {
            "a task cannot correct itself"
        } else if candidate.process_id != self.current.process_id {
            "it belongs to a different process"
        } else if candidate.ordinal >= self.current.ordinal {
            "it does not precede the current task"
        } else {
            return Ok(());
        };

        Err(StateMachineError::invalid_correction_task(
            self.current.task_id,
            candidate.task_id,
            reason,
        ))
    }

    fn description(&self) -> &'static str {
        "Correction task must precede the current task within its process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earlier_task_of_same_process_passes() {
        let current = Task::new(42, 1, "QA", 3);
        let earlier = Task::new(40, 1, "Scanning", 1);
        assert!(CorrectionTaskGuard::new(&current).check(&earlier).is_ok());
    }

    #[test]
    fn test_rejections() {
        let current = Task::new(42, 1, "QA", 3);
        let guard = CorrectionTaskGuard::new(&current);

        for candidate in [
            Task::new(42, 1, "QA", 3),
            Task::new(43, 1, "Export", 4),
            Task::new(50, 2, "Scanning", 1),
        ] {
            let err = guard.check(&candidate).unwrap_err();
            assert!(matches!(
                err,
                StateMachineError::InvalidCorrectionTask { task_id: 42, .. }
            ));
        }
    }
}
