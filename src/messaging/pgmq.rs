//! # pgmq Channels
//!
//! Ticket source and result publisher over the PostgreSQL `pgmq` extension, driven through its
//! SQL functions on a shared `sqlx` pool.

use super::channel::{ResultPublisher, TicketSource};
use super::errors::{MessagingError, MessagingResult};
use super::message::{InboundTicket, OutcomeReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Create a queue if it does not exist yet
pub async fn ensure_queue(pool: &PgPool, queue_name: &str) -> MessagingResult<()> {
    debug!("📋 Ensuring queue: {}", queue_name);
    sqlx::query("SELECT pgmq.create($1)")
        .bind(queue_name)
        .execute(pool)
        .await
        .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;
    info!("✅ Queue ready: {}", queue_name);
    Ok(())
}

#[derive(Debug)]
pub struct PgmqTicketSource {
    pool: PgPool,
    queue_name: String,
    closed: AtomicBool,
}

impl PgmqTicketSource {
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> MessagingResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::channel_closed(&self.queue_name));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketSource for PgmqTicketSource {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn receive(
        &self,
        max: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<InboundTicket>> {
        self.ensure_open()?;

        let rows = sqlx::query(
            "SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, $3)",
        )
        .bind(&self.queue_name)
        .bind(visibility_timeout.as_secs().min(i32::MAX as u64) as i32)
        .bind(max.min(i32::MAX as usize) as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MessagingError::queue_operation(&self.queue_name, "read", e.to_string()))?;

        let mut tickets = Vec::with_capacity(rows.len());
        for row in rows {
            let msg_id: i64 = row.try_get("msg_id")?;
            let read_ct: i32 = row.try_get("read_ct")?;
            let enqueued_at: DateTime<Utc> = row.try_get("enqueued_at")?;
            let message: Value = row.try_get("message")?;

            if !message.is_object() {
                warn!(
                    queue = %self.queue_name,
                    msg_id = msg_id,
                    "⚠️ Ticket payload is not a JSON object"
                );
            }
            tickets.push(InboundTicket::from_payload(
                msg_id,
                &self.queue_name,
                message,
                read_ct,
                enqueued_at,
            ));
        }

        if !tickets.is_empty() {
            debug!(
                "📥 Read {} tickets from queue: {}",
                tickets.len(),
                self.queue_name
            );
        }
        Ok(tickets)
    }

    async fn acknowledge(&self, receipt: i64) -> MessagingResult<()> {
        let deleted: bool = sqlx::query_scalar("SELECT pgmq.delete($1, $2)")
            .bind(&self.queue_name)
            .bind(receipt)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&self.queue_name, "delete", e.to_string())
            })?;

        if !deleted {
            return Err(MessagingError::queue_operation(
                &self.queue_name,
                "delete",
                format!("message {receipt} not found"),
            ));
        }
        Ok(())
    }

    async fn close(&self) -> MessagingResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        info!("🔌 Ticket source closed: {}", self.queue_name);
        Ok(())
    }
}

#[derive(Debug)]
pub struct PgmqResultPublisher {
    pool: PgPool,
    queue_name: String,
    closed: AtomicBool,
}

impl PgmqResultPublisher {
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ResultPublisher for PgmqResultPublisher {
    fn channel_name(&self) -> &str {
        &self.queue_name
    }

    async fn publish(&self, report: &OutcomeReport) -> MessagingResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::channel_closed(&self.queue_name));
        }

        let payload = serde_json::to_value(report)?;
        let msg_id: i64 = sqlx::query_scalar("SELECT pgmq.send($1, $2::jsonb)")
            .bind(&self.queue_name)
            .bind(payload)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(&self.queue_name, "send", e.to_string()))?;

        debug!(
            "📤 Published {} report {} as message {}",
            report.level, report.report_id, msg_id
        );
        Ok(())
    }

    async fn close(&self) -> MessagingResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        info!("🔌 Result publisher closed: {}", self.queue_name);
        Ok(())
    }
}
