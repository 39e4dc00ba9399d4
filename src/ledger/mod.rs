//! # Correction Ledger
//!
//! Append-only log of comments attached to tasks. ERROR comments may name a correction task
//! and are resolved at most once; nothing is ever deleted.
//!
//! The standalone [`CorrectionLedger::append`] and [`CorrectionLedger::resolve`] calls take the
//! same per-process lock as task transitions. The state machine, which already holds that
//! lock, stages its ledger writes into its own [`UnitOfWork`] instead.

use crate::models::{CorrectionComment, NewComment};
use crate::state_machine::TransitionLocks;
use crate::store::{with_timeout, StoreError, UnitOfWork, WorkflowStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Comment {comment_id} not found")]
    CommentNotFound { comment_id: i64 },

    #[error("Comment {comment_id} is already resolved")]
    AlreadyResolved { comment_id: i64 },

    #[error("Comment {comment_id} is not an error comment")]
    NotAnError { comment_id: i64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Pick the unresolved ERROR comment a resolution applies to
///
/// Only comments on `task_id` whose correction reference equals `correction_ref` qualify
/// (`None` matches comments without a reference). The most recently created one wins, ties
/// broken by the higher identifier.
pub fn select_unresolved_error(
    comments: &[CorrectionComment],
    task_id: i64,
    correction_ref: Option<i64>,
) -> Option<&CorrectionComment> {
    comments
        .iter()
        .filter(|c| {
            c.current_task_id == task_id
                && c.is_open_error()
                && c.correction_task_id == correction_ref
        })
        .max_by_key(|c| (c.created_at, c.comment_id))
}

#[derive(Debug, Clone)]
pub struct CorrectionLedger {
    store: Arc<dyn WorkflowStore>,
    locks: Arc<TransitionLocks>,
    store_timeout: Duration,
}

impl CorrectionLedger {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        locks: Arc<TransitionLocks>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            store_timeout,
        }
    }

    /// Store a new comment and return its identifier
    pub async fn append(&self, comment: NewComment) -> LedgerResult<i64> {
        let _lock = self.locks.acquire(comment.process_id).await;

        let task_id = comment.current_task_id;
        let mut work = UnitOfWork::new();
        self.stage_append(&mut work, comment);

        let receipt =
            with_timeout("commit", self.store_timeout, self.store.commit(work)).await?;
        let comment_id = receipt.comment_ids.first().copied().ok_or_else(|| {
            StoreError::invalid_data("commit returned no identifier for appended comment")
        })?;

        debug!(comment_id = comment_id, task_id = task_id, "📝 Comment appended");
        Ok(comment_id)
    }

    /// Most recent unresolved ERROR comment on `task_id` for `correction_ref`
    pub async fn find_unresolved_error(
        &self,
        task_id: i64,
        correction_ref: Option<i64>,
    ) -> LedgerResult<Option<CorrectionComment>> {
        let comments = self.comments_for_task(task_id).await?;
        Ok(select_unresolved_error(&comments, task_id, correction_ref).cloned())
    }

    /// Mark an ERROR comment resolved; a second call fails with `AlreadyResolved`
    pub async fn resolve(&self, comment_id: i64) -> LedgerResult<CorrectionComment> {
        let comment = self
            .load(comment_id)
            .await?
            .ok_or(LedgerError::CommentNotFound { comment_id })?;

        let _lock = self.locks.acquire(comment.process_id).await;
        let comment = self
            .load(comment_id)
            .await?
            .ok_or(LedgerError::CommentNotFound { comment_id })?;

        let now = Utc::now();
        let mut work = UnitOfWork::new();
        self.stage_resolve(&mut work, &comment, now)?;

        with_timeout("commit", self.store_timeout, self.store.commit(work))
            .await
            .map_err(|e| match e {
                StoreError::AlreadyResolved { comment_id } => {
                    LedgerError::AlreadyResolved { comment_id }
                }
                other => LedgerError::Store(other),
            })?;

        info!(
            comment_id = comment_id,
            task_id = comment.current_task_id,
            "✅ Error comment resolved"
        );

        Ok(CorrectionComment {
            resolved: true,
            resolved_at: Some(now),
            ..comment
        })
    }

    /// Ledger entries of a task, oldest first
    pub async fn comments_for_task(&self, task_id: i64) -> LedgerResult<Vec<CorrectionComment>> {
        Ok(with_timeout(
            "get_comments_for_task",
            self.store_timeout,
            self.store.get_comments_for_task(task_id),
        )
        .await?)
    }

    /// Queue an append into a unit of work owned by the caller
    pub fn stage_append(&self, work: &mut UnitOfWork, comment: NewComment) {
        work.append_comment(comment);
    }

    /// Queue a resolution into a unit of work owned by the caller
    pub fn stage_resolve(
        &self,
        work: &mut UnitOfWork,
        comment: &CorrectionComment,
        resolved_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        if comment.resolved {
            return Err(LedgerError::AlreadyResolved {
                comment_id: comment.comment_id,
            });
        }
        if !comment.is_open_error() {
            return Err(LedgerError::NotAnError {
                comment_id: comment.comment_id,
            });
        }
        work.resolve_comment(comment.comment_id, resolved_at);
        Ok(())
    }

    async fn load(&self, comment_id: i64) -> LedgerResult<Option<CorrectionComment>> {
        Ok(with_timeout(
            "get_comment_by_id",
            self.store_timeout,
            self.store.get_comment_by_id(comment_id),
        )
        .await?)
    }
}
