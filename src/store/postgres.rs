//! # PostgreSQL Workflow Store
//!
//! `sqlx`-backed implementation of [`WorkflowStore`]. Every [`UnitOfWork`] runs in a single
//! transaction; guarded task writes use `UPDATE ... WHERE status = $expected` so that a writer
//! on another node that got there first turns into a `ConcurrentModification` instead of a lost
//! update.

use super::{CommitReceipt, StoreError, StoreResult, UnitOfWork, WorkflowStore};
use crate::config::DatabaseConfig;
use crate::models::{CommentKind, CorrectionComment, Process, Task};
use crate::state_machine::{TaskEditType, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

const TASK_COLUMNS: &str = "task_id, process_id, title, ordinal, status, processing_user, \
     processing_begin, processing_time, processing_end, edit_type, correction, user_groups";

const COMMENT_COLUMNS: &str = "comment_id, process_id, current_task_id, kind, message, author, \
     created_at, correction_task_id, resolved, resolved_at";

#[derive(Debug, FromRow)]
struct TaskRow {
    task_id: i64,
    process_id: i64,
    title: String,
    ordinal: i32,
    status: i16,
    processing_user: Option<String>,
    processing_begin: Option<DateTime<Utc>>,
    processing_time: Option<DateTime<Utc>>,
    processing_end: Option<DateTime<Utc>>,
    edit_type: String,
    correction: bool,
    user_groups: Vec<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_value(row.status).ok_or_else(|| {
            StoreError::invalid_data(format!(
                "task {} has unknown status value {}",
                row.task_id, row.status
            ))
        })?;
        let edit_type = row
            .edit_type
            .parse::<TaskEditType>()
            .map_err(StoreError::invalid_data)?;

        Ok(Task {
            task_id: row.task_id,
            process_id: row.process_id,
            title: row.title,
            ordinal: row.ordinal,
            status,
            processing_user: row.processing_user,
            processing_begin: row.processing_begin,
            processing_time: row.processing_time,
            processing_end: row.processing_end,
            edit_type,
            correction: row.correction,
            user_groups: row.user_groups,
        })
    }
}

#[derive(Debug, FromRow)]
struct CommentRow {
    comment_id: i64,
    process_id: i64,
    current_task_id: i64,
    kind: String,
    message: String,
    author: String,
    created_at: DateTime<Utc>,
    correction_task_id: Option<i64>,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommentRow> for CorrectionComment {
    type Error = StoreError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        Ok(CorrectionComment {
            comment_id: row.comment_id,
            process_id: row.process_id,
            current_task_id: row.current_task_id,
            kind: row.kind.parse().map_err(StoreError::invalid_data)?,
            message: row.message,
            author: row.author,
            created_at: row.created_at,
            correction_task_id: row.correction_task_id,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProcessRow {
    process_id: i64,
    title: String,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

/// PostgreSQL-backed store sharing a connection pool
#[derive(Debug, Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool sized from configuration
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        info!(
            max_connections = config.max_connections,
            "Connecting workflow store to PostgreSQL"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn apply_task_updates(
        tx: &mut Transaction<'_, Postgres>,
        work: &UnitOfWork,
    ) -> StoreResult<()> {
        for update in &work.task_updates {
            let task = &update.task;
            let result = sqlx::query(
                r#"
                UPDATE taskline_tasks
                SET status = $2, processing_user = $3, processing_begin = $4,
                    processing_time = $5, processing_end = $6, edit_type = $7, correction = $8
                WHERE task_id = $1 AND ($9::SMALLINT IS NULL OR status = $9)
                "#,
            )
            .bind(task.task_id)
            .bind(task.status.value())
            .bind(&task.processing_user)
            .bind(task.processing_begin)
            .bind(task.processing_time)
            .bind(task.processing_end)
            .bind(task.edit_type.as_str())
            .bind(task.correction)
            .bind(update.expected_status.map(|s| s.value()))
            .execute(&mut **tx)
            .await?;

            if result.rows_affected() == 0 {
                let actual: Option<i16> =
                    sqlx::query_scalar("SELECT status FROM taskline_tasks WHERE task_id = $1")
                        .bind(task.task_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                return Err(match (actual.and_then(TaskStatus::from_value), update.expected_status) {
                    (Some(actual), Some(expected)) => StoreError::ConcurrentModification {
                        task_id: task.task_id,
                        expected,
                        actual,
                    },
                    _ => StoreError::not_found("task", task.task_id),
                });
            }
        }
        Ok(())
    }

    async fn apply_resolutions(
        tx: &mut Transaction<'_, Postgres>,
        work: &UnitOfWork,
    ) -> StoreResult<()> {
        for resolution in &work.resolutions {
            let result = sqlx::query(
                r#"
                UPDATE taskline_comments
                SET resolved = true, resolved_at = $2
                WHERE comment_id = $1 AND kind = 'ERROR' AND resolved = false
                "#,
            )
            .bind(resolution.comment_id)
            .bind(resolution.resolved_at)
            .execute(&mut **tx)
            .await?;

            if result.rows_affected() == 0 {
                let existing: Option<(String, bool)> = sqlx::query_as(
                    "SELECT kind, resolved FROM taskline_comments WHERE comment_id = $1",
                )
                .bind(resolution.comment_id)
                .fetch_optional(&mut **tx)
                .await?;
                return Err(match existing {
                    None => StoreError::not_found("comment", resolution.comment_id),
                    Some((_, true)) => StoreError::AlreadyResolved {
                        comment_id: resolution.comment_id,
                    },
                    Some(_) => StoreError::invalid_data(format!(
                        "comment {} is not an error comment",
                        resolution.comment_id
                    )),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn get_task_by_id(&self, task_id: i64) -> StoreResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM taskline_tasks WHERE task_id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn get_process_by_id(&self, process_id: i64) -> StoreResult<Option<Process>> {
        let row: Option<ProcessRow> = sqlx::query_as(
            "SELECT process_id, title, completed, completed_at FROM taskline_processes WHERE process_id = $1",
        )
        .bind(process_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let properties: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, value FROM taskline_process_properties WHERE process_id = $1",
        )
        .bind(process_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Process {
            process_id: row.process_id,
            title: row.title,
            completed: row.completed,
            completed_at: row.completed_at,
            properties: properties.into_iter().collect::<BTreeMap<_, _>>(),
        }))
    }

    async fn get_tasks_for_process(&self, process_id: i64) -> StoreResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM taskline_tasks WHERE process_id = $1 ORDER BY ordinal"
        ))
        .bind(process_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn get_next_ordinal_task(
        &self,
        process_id: i64,
        after_ordinal: i32,
    ) -> StoreResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM taskline_tasks \
             WHERE process_id = $1 AND ordinal > $2 ORDER BY ordinal LIMIT 1"
        ))
        .bind(process_id)
        .bind(after_ordinal)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn get_comments_for_task(&self, task_id: i64) -> StoreResult<Vec<CorrectionComment>> {
        let rows: Vec<CommentRow> = sqlx::query_as(&format!(
            "SELECT {COMMENT_COLUMNS} FROM taskline_comments \
             WHERE current_task_id = $1 ORDER BY created_at, comment_id"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CorrectionComment::try_from).collect()
    }

    async fn get_comment_by_id(&self, comment_id: i64) -> StoreResult<Option<CorrectionComment>> {
        let row: Option<CommentRow> = sqlx::query_as(&format!(
            "SELECT {COMMENT_COLUMNS} FROM taskline_comments WHERE comment_id = $1"
        ))
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CorrectionComment::try_from).transpose()
    }

    async fn commit(&self, work: UnitOfWork) -> StoreResult<CommitReceipt> {
        let mut tx = self.pool.begin().await?;

        Self::apply_task_updates(&mut tx, &work).await?;

        let mut comment_ids = Vec::with_capacity(work.new_comments.len());
        for comment in &work.new_comments {
            let comment_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO taskline_comments
                (process_id, current_task_id, kind, message, author, created_at, correction_task_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING comment_id
                "#,
            )
            .bind(comment.process_id)
            .bind(comment.current_task_id)
            .bind(comment.kind.as_str())
            .bind(&comment.message)
            .bind(&comment.author)
            .bind(comment.created_at)
            .bind(comment.correction_task_id)
            .fetch_one(&mut *tx)
            .await?;
            comment_ids.push(comment_id);
        }

        Self::apply_resolutions(&mut tx, &work).await?;

        if let Some(completion) = &work.completed_process {
            let result = sqlx::query(
                "UPDATE taskline_processes SET completed = true, completed_at = $2 WHERE process_id = $1",
            )
            .bind(completion.process_id)
            .bind(completion.completed_at)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("process", completion.process_id));
            }
        }

        if let Some(overrides) = &work.property_overrides {
            for (name, value) in &overrides.properties {
                sqlx::query(
                    r#"
                    INSERT INTO taskline_process_properties (process_id, name, value)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (process_id, name) DO UPDATE SET value = EXCLUDED.value
                    "#,
                )
                .bind(overrides.process_id)
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        debug!(
            tasks = work.task_updates.len(),
            comments = comment_ids.len(),
            resolutions = work.resolutions.len(),
            "Unit of work committed"
        );
        Ok(CommitReceipt { comment_ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewComment;

    fn task_row(status: i16, edit_type: &str) -> TaskRow {
        TaskRow {
            task_id: 5,
            process_id: 1,
            title: "Scan".to_string(),
            ordinal: 2,
            status,
            processing_user: None,
            processing_begin: None,
            processing_time: None,
            processing_end: None,
            edit_type: edit_type.to_string(),
            correction: false,
            user_groups: vec!["scanners".to_string()],
        }
    }

    #[test]
    fn test_task_row_conversion() {
        let task = Task::try_from(task_row(2, "queue")).unwrap();
        assert_eq!(task.status, TaskStatus::InWork);
        assert_eq!(task.edit_type, TaskEditType::Queue);
        assert_eq!(task.user_groups, vec!["scanners".to_string()]);
    }

    #[test]
    fn test_task_row_with_unknown_status_is_rejected() {
        let err = Task::try_from(task_row(9, "queue")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData { .. }));

        let err = Task::try_from(task_row(1, "robot")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData { .. }));
    }

    #[test]
    fn test_comment_row_conversion() {
        let comment = CorrectionComment::try_from(CommentRow {
            comment_id: 3,
            process_id: 1,
            current_task_id: 5,
            kind: "ERROR".to_string(),
            message: "bad scan".to_string(),
            author: "jdoe".to_string(),
            created_at: Utc::now(),
            correction_task_id: Some(4),
            resolved: false,
            resolved_at: None,
        })
        .unwrap();
        assert_eq!(comment.kind, CommentKind::Error);
        assert!(comment.is_open_error());
    }

    /// Process 1 with tasks 40 (Done), 41 (InWork) and 42 (Locked)
    async fn seeded_store(pool: &PgPool) -> PgWorkflowStore {
        sqlx::query("INSERT INTO taskline_processes (process_id, title) VALUES (1, 'Monograph')")
            .execute(pool)
            .await
            .unwrap();
        for (task_id, ordinal, status) in [(40_i64, 1_i32, 3_i16), (41, 2, 2), (42, 3, 0)] {
            sqlx::query(
                "INSERT INTO taskline_tasks (task_id, process_id, title, ordinal, status) \
                 VALUES ($1, 1, $2, $3, $4)",
            )
            .bind(task_id)
            .bind(format!("Step {ordinal}"))
            .bind(ordinal)
            .bind(status)
            .execute(pool)
            .await
            .unwrap();
        }
        PgWorkflowStore::new(pool.clone())
    }

    async fn stored_task(store: &PgWorkflowStore, task_id: i64) -> Task {
        store.get_task_by_id(task_id).await.unwrap().unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_stale_expected_status_reports_actual(pool: PgPool) {
        let store = seeded_store(&pool).await;
        let closed = stored_task(&store, 41).await.with_status(TaskStatus::Done);

        let mut work = UnitOfWork::new();
        work.update_task(TaskStatus::Open, closed);
        let err = store.commit(work).await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::ConcurrentModification {
                task_id: 41,
                expected: TaskStatus::Open,
                actual: TaskStatus::InWork,
            }
        ));
        assert_eq!(stored_task(&store, 41).await.status, TaskStatus::InWork);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_update_of_missing_task_is_not_found(pool: PgPool) {
        let store = seeded_store(&pool).await;
        let mut work = UnitOfWork::new();
        work.update_task(TaskStatus::Open, Task::new(99, 1, "Ghost", 9));

        let err = store.commit(work).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "task", id: 99 }));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_unit_of_work_commits_every_write(pool: PgPool) {
        let store = seeded_store(&pool).await;
        let now = Utc::now();

        let mut closed = stored_task(&store, 41).await.with_status(TaskStatus::Done);
        closed.processing_end = Some(now);
        let opened = stored_task(&store, 42).await.with_status(TaskStatus::Open);

        let mut work = UnitOfWork::new();
        work.update_task(TaskStatus::InWork, closed)
            .update_task(TaskStatus::Locked, opened)
            .append_comment(NewComment::info(1, 41, "scanned", "jdoe", now))
            .complete_process(1, now)
            .override_properties(
                1,
                BTreeMap::from([("scanner".to_string(), "A2".to_string())]),
            );
        let receipt = store.commit(work).await.unwrap();
        assert_eq!(receipt.comment_ids.len(), 1);

        let statuses: Vec<TaskStatus> = store
            .get_tasks_for_process(1)
            .await
            .unwrap()
            .iter()
            .map(|t| t.status)
            .collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Done, TaskStatus::Done, TaskStatus::Open]
        );
        assert!(stored_task(&store, 41).await.processing_end.is_some());

        let next = store.get_next_ordinal_task(1, 2).await.unwrap().unwrap();
        assert_eq!(next.task_id, 42);

        let comments = store.get_comments_for_task(41).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].comment_id, receipt.comment_ids[0]);
        assert_eq!(comments[0].kind, CommentKind::Info);

        let process = store.get_process_by_id(1).await.unwrap().unwrap();
        assert!(process.completed);
        assert!(process.completed_at.is_some());
        assert_eq!(process.properties.get("scanner").map(String::as_str), Some("A2"));
        assert!(store.get_process_by_id(2).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_double_resolution_writes_nothing(pool: PgPool) {
        let store = seeded_store(&pool).await;
        let mut work = UnitOfWork::new();
        work.append_comment(NewComment::error(1, 42, "bad scan", "jdoe", Utc::now(), Some(40)));
        let comment_id = store.commit(work).await.unwrap().comment_ids[0];

        let mut resolve = UnitOfWork::new();
        resolve.resolve_comment(comment_id, Utc::now());
        store.commit(resolve).await.unwrap();
        let resolved = store.get_comment_by_id(comment_id).await.unwrap().unwrap();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());

        let opened = stored_task(&store, 42).await.with_status(TaskStatus::Open);
        let mut again = UnitOfWork::new();
        again
            .update_task(TaskStatus::Locked, opened)
            .append_comment(NewComment::info(1, 42, "retry", "jdoe", Utc::now()))
            .resolve_comment(comment_id, Utc::now());
        let err = store.commit(again).await.unwrap_err();

        assert!(matches!(err, StoreError::AlreadyResolved { comment_id: id } if id == comment_id));
        assert_eq!(stored_task(&store, 42).await.status, TaskStatus::Locked);
        assert_eq!(store.get_comments_for_task(42).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_resolving_info_comment_is_rejected(pool: PgPool) {
        let store = seeded_store(&pool).await;
        let mut work = UnitOfWork::new();
        work.append_comment(NewComment::info(1, 41, "note", "jdoe", Utc::now()));
        let comment_id = store.commit(work).await.unwrap().comment_ids[0];

        let mut resolve = UnitOfWork::new();
        resolve.resolve_comment(comment_id, Utc::now());
        let err = store.commit(resolve).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidData { .. }));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_failed_completion_rolls_back(pool: PgPool) {
        let store = seeded_store(&pool).await;
        let closed = stored_task(&store, 41).await.with_status(TaskStatus::Done);

        let mut work = UnitOfWork::new();
        work.update_task(TaskStatus::InWork, closed)
            .append_comment(NewComment::info(1, 41, "done", "jdoe", Utc::now()))
            .complete_process(999, Utc::now())
            .override_properties(
                1,
                BTreeMap::from([("scanner".to_string(), "A2".to_string())]),
            );
        let err = store.commit(work).await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound { entity: "process", id: 999 }));
        assert_eq!(stored_task(&store, 41).await.status, TaskStatus::InWork);
        assert!(store.get_comments_for_task(41).await.unwrap().is_empty());
        let process = store.get_process_by_id(1).await.unwrap().unwrap();
        assert!(!process.completed);
        assert!(process.properties.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_failed_override_rolls_back(pool: PgPool) {
        let store = seeded_store(&pool).await;
        let closed = stored_task(&store, 41).await.with_status(TaskStatus::Done);

        let mut work = UnitOfWork::new();
        work.update_task(TaskStatus::InWork, closed).override_properties(
            999,
            BTreeMap::from([("scanner".to_string(), "A2".to_string())]),
        );
        let err = store.commit(work).await.unwrap_err();

        assert!(matches!(err, StoreError::Database(_)));
        assert_eq!(stored_task(&store, 41).await.status, TaskStatus::InWork);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_save_task_skips_status_guard(pool: PgPool) {
        let store = seeded_store(&pool).await;
        let mut task = stored_task(&store, 42).await.with_status(TaskStatus::InWork);
        task.processing_user = Some("jdoe".to_string());
        task.edit_type = TaskEditType::Admin;
        store.save_task(task).await.unwrap();

        let stored = stored_task(&store, 42).await;
        assert_eq!(stored.status, TaskStatus::InWork);
        assert_eq!(stored.processing_user.as_deref(), Some("jdoe"));
        assert_eq!(stored.edit_type, TaskEditType::Admin);

        let err = store.save_task(Task::new(99, 1, "Ghost", 9)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "task", .. }));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_mark_process_complete(pool: PgPool) {
        let store = seeded_store(&pool).await;
        store.mark_process_complete(1).await.unwrap();
        assert!(store.get_process_by_id(1).await.unwrap().unwrap().completed);

        let err = store.mark_process_complete(5).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "process", id: 5 }));
    }
}
