//! Task mutations applied by the state machine.
//!
//! Each function takes the task as observed under the process lock and returns the version to
//! be written. None of them touch the store.

use super::states::{TaskEditType, TaskStatus};
use crate::models::{Identity, Task};
use chrono::{DateTime, Utc};

/// OPEN → INWORK
pub fn start_work(
    mut task: Task,
    identity: &Identity,
    edit_type: TaskEditType,
    now: DateTime<Utc>,
) -> Task {
    task.status = TaskStatus::InWork;
    task.processing_user = Some(identity.login.clone());
    task.processing_begin.get_or_insert(now);
    task.processing_time = Some(now);
    task.edit_type = edit_type;
    task
}

/// INWORK → LOCKED after a problem report
pub fn lock_for_problem(
    mut task: Task,
    identity: &Identity,
    edit_type: TaskEditType,
    now: DateTime<Utc>,
) -> Task {
    task.status = TaskStatus::Locked;
    task.processing_user = Some(identity.login.clone());
    task.processing_begin = None;
    task.processing_time = Some(now);
    task.edit_type = edit_type;
    task
}

/// Reopen the earlier task that has to redo its work
pub fn open_for_correction(mut task: Task, now: DateTime<Utc>) -> Task {
    task.status = TaskStatus::Open;
    task.correction = true;
    task.processing_end = None;
    task.processing_time = Some(now);
    task
}

/// Hold a task lying between the correction task and the reporting task
pub fn lock_for_correction(mut task: Task) -> Task {
    task.status = TaskStatus::Locked;
    task.correction = true;
    task.processing_end = None;
    task
}

/// Finish a task of the corrected range once the problem is solved
pub fn complete_correction(mut task: Task, now: DateTime<Utc>) -> Task {
    task.status = TaskStatus::Done;
    task.correction = false;
    task.processing_end = Some(now);
    task
}

/// Reopen the reporting task after its problem was solved
///
/// Solving through a correction task stamps the edit time, a plain resolution clears it.
pub fn reopen_after_problem(
    mut task: Task,
    edit_type: TaskEditType,
    now: DateTime<Utc>,
    via_correction_task: bool,
) -> Task {
    task.status = TaskStatus::Open;
    task.processing_begin = None;
    task.processing_time = via_correction_task.then_some(now);
    task.edit_type = edit_type;
    task
}

/// OPEN/INWORK → DONE; an OPEN task is taken into work by `identity` on the way
pub fn close(
    mut task: Task,
    identity: &Identity,
    edit_type: TaskEditType,
    now: DateTime<Utc>,
) -> Task {
    if task.status == TaskStatus::Open {
        task = start_work(task, identity, edit_type, now);
    }
    task.status = TaskStatus::Done;
    task.processing_time = Some(now);
    task.processing_end = Some(now);
    task.edit_type = edit_type;
    task
}

/// LOCKED → OPEN for the successor of a closed task
pub fn open_next(mut task: Task, now: DateTime<Utc>) -> Task {
    task.status = TaskStatus::Open;
    task.processing_time = Some(now);
    task.edit_type = TaskEditType::Automatic;
    task
}
