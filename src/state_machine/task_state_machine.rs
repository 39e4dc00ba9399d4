use super::{
    actions,
    errors::{StateMachineError, StateMachineResult},
    events::{ActionTicket, TaskAction},
    guards::{CorrectionTaskGuard, StateGuard},
    locks::TransitionLocks,
    states::{TaskEditType, TaskStatus},
};
use crate::ledger::{CorrectionLedger, LedgerError};
use crate::logging::log_transition;
use crate::models::{Identity, NewComment, Task};
use crate::store::{with_timeout, StoreError, UnitOfWork, WorkflowStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Who is acting and how the edit should be tagged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionContext {
    pub identity: Identity,
    pub edit_type: TaskEditType,
}

impl TransitionContext {
    pub fn new(identity: Identity, edit_type: TaskEditType) -> Self {
        Self {
            identity,
            edit_type,
        }
    }
}

/// What a successfully applied ticket changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub task_id: i64,
    pub process_id: i64,
    pub action: TaskAction,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub appended_comment_ids: Vec<i64>,
    pub resolved_comment_id: Option<i64>,
    /// Task moved to OPEN as a side effect (successor on CLOSE, correction task on ERROR_OPEN)
    pub opened_task_id: Option<i64>,
    pub process_completed: bool,
    pub touched_task_ids: Vec<i64>,
    /// Remark for the outcome report, set when the ticket was accepted without effect
    pub note: Option<String>,
}

impl TransitionOutcome {
    fn new(task: &Task, action: TaskAction, to: TaskStatus) -> Self {
        Self {
            task_id: task.task_id,
            process_id: task.process_id,
            action,
            from: task.status,
            to,
            appended_comment_ids: Vec::new(),
            resolved_comment_id: None,
            opened_task_id: None,
            process_completed: false,
            touched_task_ids: Vec::new(),
            note: None,
        }
    }

    /// Check whether the ticket was accepted without writing anything
    pub fn is_noop(&self) -> bool {
        self.touched_task_ids.is_empty()
            && self.appended_comment_ids.is_empty()
            && self.resolved_comment_id.is_none()
    }
}

/// Authoritative owner of task status
///
/// Every ticket runs its read-check-write sequence under the owning process's lock and lands
/// all of its writes in one [`UnitOfWork`], so a ticket either takes full effect or none.
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    store: Arc<dyn WorkflowStore>,
    ledger: CorrectionLedger,
    locks: Arc<TransitionLocks>,
    store_timeout: Duration,
}

impl TaskStateMachine {
    pub fn new(store: Arc<dyn WorkflowStore>, store_timeout: Duration) -> Self {
        let locks = Arc::new(TransitionLocks::new());
        let ledger = CorrectionLedger::new(Arc::clone(&store), Arc::clone(&locks), store_timeout);
        Self {
            store,
            ledger,
            locks,
            store_timeout,
        }
    }

    /// Ledger sharing this state machine's locks
    pub fn ledger(&self) -> &CorrectionLedger {
        &self.ledger
    }

    pub fn locks(&self) -> &Arc<TransitionLocks> {
        &self.locks
    }

    /// Get the current status of a task
    pub async fn current_status(&self, task_id: i64) -> StateMachineResult<TaskStatus> {
        self.load_task(task_id)
            .await?
            .map(|task| task.status)
            .ok_or(StateMachineError::TaskNotFound { task_id })
    }

    /// Apply a ticket to its task
    #[instrument(skip(self, ticket, ctx), fields(task_id = ticket.task_id, action = %ticket.action))]
    pub async fn apply(
        &self,
        ticket: &ActionTicket,
        ctx: &TransitionContext,
    ) -> StateMachineResult<TransitionOutcome> {
        ticket.validate()?;

        let task_id = ticket.task_id;
        let process_id = self
            .load_task(task_id)
            .await?
            .ok_or(StateMachineError::TaskNotFound { task_id })?
            .process_id;

        let _lock = self.locks.acquire(process_id).await;

        // re-read under the lock; the status seen before may already be stale
        let current = self
            .load_task(task_id)
            .await?
            .ok_or(StateMachineError::TaskNotFound { task_id })?;
        let target = Self::determine_target_status(&current, ticket.action)?;

        let now = Utc::now();
        let mut work = UnitOfWork::new();
        let mut outcome = TransitionOutcome::new(&current, ticket.action, target);

        match ticket.action {
            TaskAction::Process => {
                let started = actions::start_work(current.clone(), &ctx.identity, ctx.edit_type, now);
                work.update_task(current.status, started);
            }
            TaskAction::ErrorOpen => {
                self.plan_error_open(&current, ticket, ctx, now, &mut work, &mut outcome)
                    .await?;
            }
            TaskAction::ErrorClose => {
                let resolved = self
                    .plan_error_close(&current, ticket, ctx, now, &mut work, &mut outcome)
                    .await?;
                if !resolved {
                    return Ok(outcome);
                }
            }
            TaskAction::Close => {
                self.plan_close(&current, ctx, now, &mut work, &mut outcome)
                    .await?;
            }
            TaskAction::Comment => {}
        }

        if let Some(comment) = Self::message_comment(&current, ticket, ctx, now) {
            self.ledger.stage_append(&mut work, comment);
        }
        work.override_properties(current.process_id, ticket.properties.clone());

        outcome.touched_task_ids = work.touched_task_ids();
        let receipt = self.commit(&current, ticket.action, work).await?;
        outcome.appended_comment_ids = receipt.comment_ids;

        if outcome.from != outcome.to {
            log_transition(
                current.task_id,
                current.process_id,
                ticket.action.as_str(),
                outcome.from.as_str(),
                outcome.to.as_str(),
            );
        } else {
            debug!(
                task_id = current.task_id,
                comments = outcome.appended_comment_ids.len(),
                "Ticket applied without status change"
            );
        }

        Ok(outcome)
    }

    /// Determine the target status for `action`, rejecting illegal combinations
    pub fn determine_target_status(
        task: &Task,
        action: TaskAction,
    ) -> StateMachineResult<TaskStatus> {
        let target = match (task.status, action) {
            (TaskStatus::Open, TaskAction::Process) => TaskStatus::InWork,
            (TaskStatus::InWork, TaskAction::ErrorOpen) => TaskStatus::Locked,
            (TaskStatus::Locked | TaskStatus::InWork, TaskAction::ErrorClose) => TaskStatus::Open,
            (TaskStatus::Open | TaskStatus::InWork, TaskAction::Close) => TaskStatus::Done,
            (status, TaskAction::Comment) => status,
            (observed, action) => {
                return Err(StateMachineError::illegal_transition(
                    task.task_id,
                    action,
                    observed,
                ))
            }
        };
        Ok(target)
    }

    async fn plan_error_open(
        &self,
        current: &Task,
        ticket: &ActionTicket,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
        work: &mut UnitOfWork,
        outcome: &mut TransitionOutcome,
    ) -> StateMachineResult<()> {
        work.update_task(
            current.status,
            actions::lock_for_problem(current.clone(), &ctx.identity, ctx.edit_type, now),
        );

        if let Some(correction_task_id) = ticket.correction_task_id {
            let correction_task = self.load_correction_task(current, correction_task_id).await?;

            for task in self.tasks_of(current.process_id).await? {
                if task.ordinal > correction_task.ordinal && task.ordinal < current.ordinal {
                    work.update_task(task.status, actions::lock_for_correction(task));
                }
            }
            work.update_task(
                correction_task.status,
                actions::open_for_correction(correction_task, now),
            );
            outcome.opened_task_id = Some(correction_task_id);
        }

        let comment = NewComment::error(
            current.process_id,
            current.task_id,
            ticket.message.clone().unwrap_or_default(),
            &ctx.identity.login,
            now,
            ticket.correction_task_id,
        );
        self.ledger.stage_append(work, comment);
        Ok(())
    }

    /// Returns `false` when no unresolved error matched and nothing should be written
    async fn plan_error_close(
        &self,
        current: &Task,
        ticket: &ActionTicket,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
        work: &mut UnitOfWork,
        outcome: &mut TransitionOutcome,
    ) -> StateMachineResult<bool> {
        let correction_ref = ticket.correction_task_id;
        let Some(comment) = self
            .ledger
            .find_unresolved_error(current.task_id, correction_ref)
            .await?
        else {
            let note = match correction_ref {
                Some(id) => format!(
                    "No unresolved error for correction task {id} on task {}; nothing changed",
                    current.task_id
                ),
                None => format!(
                    "No unresolved error on task {}; nothing changed",
                    current.task_id
                ),
            };
            warn!(
                task_id = current.task_id,
                correction_task_id = correction_ref,
                "⚠️ ERROR_CLOSE matched no unresolved error comment"
            );
            outcome.to = current.status;
            outcome.note = Some(note);
            return Ok(false);
        };

        work.update_task(
            current.status,
            actions::reopen_after_problem(current.clone(), ctx.edit_type, now, correction_ref.is_some()),
        );

        if let Some(correction_task_id) = correction_ref {
            let correction_task = self.load_correction_task(current, correction_task_id).await?;
            for task in self.tasks_of(current.process_id).await? {
                if task.ordinal >= correction_task.ordinal && task.ordinal < current.ordinal {
                    work.update_task(task.status, actions::complete_correction(task, now));
                }
            }
        }

        self.ledger.stage_resolve(work, &comment, now)?;
        outcome.resolved_comment_id = Some(comment.comment_id);
        Ok(true)
    }

    async fn plan_close(
        &self,
        current: &Task,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
        work: &mut UnitOfWork,
        outcome: &mut TransitionOutcome,
    ) -> StateMachineResult<()> {
        work.update_task(
            current.status,
            actions::close(current.clone(), &ctx.identity, ctx.edit_type, now),
        );

        match self.next_unfinished_task(current).await? {
            Some(next) if next.status == TaskStatus::Locked => {
                outcome.opened_task_id = Some(next.task_id);
                work.update_task(TaskStatus::Locked, actions::open_next(next, now));
            }
            Some(next) => {
                debug!(
                    task_id = current.task_id,
                    next_task_id = next.task_id,
                    next_status = %next.status,
                    "Successor already active, nothing to open"
                );
            }
            None => {
                work.complete_process(current.process_id, now);
                outcome.process_completed = true;
            }
        }
        Ok(())
    }

    /// ERROR_OPEN always records an ERROR comment on its own; other actions turn a message
    /// into an INFO comment
    fn message_comment(
        current: &Task,
        ticket: &ActionTicket,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
    ) -> Option<NewComment> {
        if ticket.action == TaskAction::ErrorOpen {
            return None;
        }
        let message = ticket.message.as_deref().filter(|m| !m.trim().is_empty())?;
        Some(NewComment::info(
            current.process_id,
            current.task_id,
            message,
            &ctx.identity.login,
            now,
        ))
    }

    async fn next_unfinished_task(&self, current: &Task) -> StateMachineResult<Option<Task>> {
        let mut after = current.ordinal;
        loop {
            let next = with_timeout(
                "get_next_ordinal_task",
                self.store_timeout,
                self.store.get_next_ordinal_task(current.process_id, after),
            )
            .await?;
            match next {
                Some(task) if task.status == TaskStatus::Done => after = task.ordinal,
                other => return Ok(other),
            }
        }
    }

    async fn load_correction_task(
        &self,
        current: &Task,
        correction_task_id: i64,
    ) -> StateMachineResult<Task> {
        let task = self.load_task(correction_task_id).await?.ok_or_else(|| {
            StateMachineError::invalid_correction_task(
                current.task_id,
                correction_task_id,
                "task does not exist",
            )
        })?;
        CorrectionTaskGuard::new(current).check(&task)?;
        Ok(task)
    }

    async fn load_task(&self, task_id: i64) -> StateMachineResult<Option<Task>> {
        Ok(with_timeout(
            "get_task_by_id",
            self.store_timeout,
            self.store.get_task_by_id(task_id),
        )
        .await?)
    }

    async fn tasks_of(&self, process_id: i64) -> StateMachineResult<Vec<Task>> {
        Ok(with_timeout(
            "get_tasks_for_process",
            self.store_timeout,
            self.store.get_tasks_for_process(process_id),
        )
        .await?)
    }

    async fn commit(
        &self,
        current: &Task,
        action: TaskAction,
        work: UnitOfWork,
    ) -> StateMachineResult<crate::store::CommitReceipt> {
        with_timeout("commit", self.store_timeout, self.store.commit(work))
            .await
            .map_err(|e| match e {
                StoreError::ConcurrentModification {
                    task_id, actual, ..
                } if task_id == current.task_id => {
                    StateMachineError::illegal_transition(task_id, action, actual)
                }
                StoreError::AlreadyResolved { comment_id } => {
                    StateMachineError::Ledger(LedgerError::AlreadyResolved { comment_id })
                }
                other => StateMachineError::Store(other),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentKind, Process};
    use crate::store::InMemoryWorkflowStore;

    /// Process 1 with five tasks; `statuses` gives the status of ordinals 1..=5
    fn machine_with(statuses: [TaskStatus; 5]) -> (Arc<InMemoryWorkflowStore>, TaskStateMachine) {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let tasks = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let ordinal = i as i32 + 1;
                Task::new(39 + ordinal as i64, 1, format!("Step {ordinal}"), ordinal)
                    .with_status(*status)
            })
            .collect();
        store.insert_process(Process::new(1, "Monograph"), tasks);
        let machine = TaskStateMachine::new(store.clone(), Duration::from_secs(1));
        (store, machine)
    }

    fn ctx() -> TransitionContext {
        TransitionContext::new(Identity::new("jdoe", "Jane Doe"), TaskEditType::Queue)
    }

    use crate::state_machine::TaskStatus::{Done, InWork, Locked, Open};

    #[test]
    fn test_transition_table() {
        let task = |status| Task::new(1, 1, "QA", 1).with_status(status);
        let target = |status, action| TaskStateMachine::determine_target_status(&task(status), action);

        assert_eq!(target(Open, TaskAction::Process).unwrap(), InWork);
        assert_eq!(target(InWork, TaskAction::ErrorOpen).unwrap(), Locked);
        assert_eq!(target(Locked, TaskAction::ErrorClose).unwrap(), Open);
        assert_eq!(target(InWork, TaskAction::ErrorClose).unwrap(), Open);
        assert_eq!(target(InWork, TaskAction::Close).unwrap(), Done);
        assert_eq!(target(Open, TaskAction::Close).unwrap(), Done);
        assert_eq!(target(Done, TaskAction::Comment).unwrap(), Done);

        for (status, action) in [
            (Done, TaskAction::Process),
            (InWork, TaskAction::Process),
            (Open, TaskAction::ErrorOpen),
            (Open, TaskAction::ErrorClose),
            (Locked, TaskAction::Close),
            (Done, TaskAction::Close),
        ] {
            let err = target(status, action).unwrap_err();
            assert!(matches!(
                err,
                StateMachineError::IllegalStateTransition { observed, .. } if observed == status
            ));
        }
    }

    #[tokio::test]
    async fn test_process_assigns_identity() {
        let (store, machine) = machine_with([Done, Done, Open, Locked, Locked]);
        let outcome = machine
            .apply(&ActionTicket::new(42, TaskAction::Process), &ctx())
            .await
            .unwrap();

        assert_eq!((outcome.from, outcome.to), (Open, InWork));
        let task = store.task(42).unwrap();
        assert_eq!(task.status, InWork);
        assert_eq!(task.processing_user.as_deref(), Some("jdoe"));
        assert_eq!(task.edit_type, TaskEditType::Queue);
        assert!(task.processing_begin.is_some());
    }

    #[tokio::test]
    async fn test_close_opens_successor() {
        let (store, machine) = machine_with([Done, Done, InWork, Locked, Locked]);
        let outcome = machine
            .apply(&ActionTicket::new(42, TaskAction::Close), &ctx())
            .await
            .unwrap();

        assert_eq!(outcome.opened_task_id, Some(43));
        assert!(!outcome.process_completed);
        assert_eq!(store.task(42).unwrap().status, Done);
        assert_eq!(store.task(43).unwrap().status, Open);
        assert_eq!(store.task(44).unwrap().status, Locked);
    }

    #[tokio::test]
    async fn test_close_skips_finished_successors() {
        let (store, machine) = machine_with([Done, Done, InWork, Done, Locked]);
        let outcome = machine
            .apply(&ActionTicket::new(42, TaskAction::Close), &ctx())
            .await
            .unwrap();

        assert_eq!(outcome.opened_task_id, Some(44));
        assert_eq!(store.task(44).unwrap().status, Open);
    }

    #[tokio::test]
    async fn test_closing_last_task_completes_process() {
        let (store, machine) = machine_with([Done, Done, Done, Done, InWork]);
        let outcome = machine
            .apply(&ActionTicket::new(44, TaskAction::Close), &ctx())
            .await
            .unwrap();

        assert!(outcome.process_completed);
        assert!(store.process(1).unwrap().completed);
    }

    #[tokio::test]
    async fn test_error_open_with_correction_task() {
        let (store, machine) = machine_with([Done, Done, InWork, Locked, Locked]);
        let ticket = ActionTicket::new(42, TaskAction::ErrorOpen)
            .with_message("pages missing")
            .with_correction_task(40);

        let outcome = machine.apply(&ticket, &ctx()).await.unwrap();
        assert_eq!(outcome.opened_task_id, Some(40));
        assert_eq!(outcome.touched_task_ids, vec![42, 41, 40]);

        let correction = store.task(40).unwrap();
        assert_eq!(correction.status, Open);
        assert!(correction.correction);
        let between = store.task(41).unwrap();
        assert_eq!(between.status, Locked);
        assert!(between.correction);
        assert_eq!(store.task(42).unwrap().status, Locked);

        let comments = store.comments_for_task(42);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].kind, CommentKind::Error);
        assert_eq!(comments[0].correction_task_id, Some(40));
    }

    #[tokio::test]
    async fn test_error_close_with_correction_task_finishes_range() {
        let (store, machine) = machine_with([Done, Done, InWork, Locked, Locked]);
        machine
            .apply(
                &ActionTicket::new(42, TaskAction::ErrorOpen)
                    .with_message("pages missing")
                    .with_correction_task(40),
                &ctx(),
            )
            .await
            .unwrap();

        let outcome = machine
            .apply(
                &ActionTicket::new(42, TaskAction::ErrorClose).with_correction_task(40),
                &ctx(),
            )
            .await
            .unwrap();

        assert!(outcome.resolved_comment_id.is_some());
        for id in [40, 41] {
            let task = store.task(id).unwrap();
            assert_eq!(task.status, Done);
            assert!(!task.correction);
            assert!(task.processing_end.is_some());
        }
        let current = store.task(42).unwrap();
        assert_eq!(current.status, Open);
        assert!(current.processing_begin.is_none());
        assert!(current.processing_time.is_some());
    }

    #[tokio::test]
    async fn test_correction_task_must_precede() {
        let (store, machine) = machine_with([Done, Done, InWork, Locked, Locked]);
        let ticket = ActionTicket::new(42, TaskAction::ErrorOpen).with_correction_task(43);

        let err = machine.apply(&ticket, &ctx()).await.unwrap_err();
        assert!(matches!(err, StateMachineError::InvalidCorrectionTask { .. }));
        assert_eq!(store.task(42).unwrap().status, InWork);
        assert_eq!(store.comment_count(), 0);
    }

    #[tokio::test]
    async fn test_error_close_without_match_changes_nothing() {
        let (store, machine) = machine_with([Done, Done, Locked, Locked, Locked]);
        let outcome = machine
            .apply(&ActionTicket::new(42, TaskAction::ErrorClose), &ctx())
            .await
            .unwrap();

        assert!(outcome.is_noop());
        assert!(outcome.note.is_some());
        assert_eq!(outcome.to, Locked);
        assert_eq!(store.task(42).unwrap().status, Locked);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_comment() {
        let (store, machine) = machine_with([Done, Done, InWork, Locked, Locked]);
        store.fail_next_commit();

        let err = machine
            .apply(
                &ActionTicket::new(42, TaskAction::ErrorOpen).with_message("bad scan"),
                &ctx(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StateMachineError::Store(ref e) if e.is_transient()));
        assert_eq!(store.task(42).unwrap().status, InWork);
        assert_eq!(store.comment_count(), 0);
    }

    #[tokio::test]
    async fn test_properties_written_with_transition() {
        let (store, machine) = machine_with([Done, Done, Open, Locked, Locked]);
        machine
            .apply(
                &ActionTicket::new(42, TaskAction::Process).with_property("scanner", "A2"),
                &ctx(),
            )
            .await
            .unwrap();

        let process = store.process(1).unwrap();
        assert_eq!(process.properties.get("scanner").map(String::as_str), Some("A2"));
    }

    #[tokio::test]
    async fn test_store_timeout() {
        let store = Arc::new(
            InMemoryWorkflowStore::new().with_latency(Duration::from_millis(200)),
        );
        store.insert_process(
            Process::new(1, "Monograph"),
            vec![Task::new(42, 1, "QA", 1).with_status(Open)],
        );
        let machine = TaskStateMachine::new(store.clone(), Duration::from_millis(20));

        let err = machine
            .apply(&ActionTicket::new(42, TaskAction::Process), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, StateMachineError::Store(StoreError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_current_status_follows_transitions() {
        let (_store, machine) = machine_with([Done, Done, Open, Locked, Locked]);
        assert_eq!(machine.current_status(42).await.unwrap(), Open);

        machine
            .apply(&ActionTicket::new(42, TaskAction::Process), &ctx())
            .await
            .unwrap();
        assert_eq!(machine.current_status(42).await.unwrap(), InWork);

        let err = machine.current_status(999).await.unwrap_err();
        assert!(matches!(err, StateMachineError::TaskNotFound { task_id: 999 }));
    }
}
