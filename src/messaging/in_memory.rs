//! # In-Memory Channels
//!
//! Ticket queue and result channel used by tests and embedded deployments.
//!
//! - **Visibility timeout**: received tickets stay hidden until acknowledged or until the
//!   timeout elapses, then they are handed out again with a higher delivery count
//! - **Failure injection**: the result channel can be told to reject publishes

use super::channel::{ResultPublisher, TicketSource};
use super::errors::{MessagingError, MessagingResult};
use super::message::{InboundTicket, OutcomeReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

#[derive(Debug, Clone)]
struct QueuedTicket {
    id: i64,
    payload: Value,
    enqueued_at: DateTime<Utc>,
    visible_at: Option<DateTime<Utc>>,
    receive_count: i32,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<QueuedTicket>,
    next_id: i64,
}

#[derive(Debug)]
pub struct InMemoryTicketQueue {
    queue_name: String,
    state: RwLock<QueueState>,
    closed: AtomicBool,
    total_acked: AtomicU64,
}

impl InMemoryTicketQueue {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            state: RwLock::new(QueueState::default()),
            closed: AtomicBool::new(false),
            total_acked: AtomicU64::new(0),
        }
    }

    /// Enqueue a raw ticket payload, returning its receipt
    pub async fn send(&self, payload: Value) -> MessagingResult<i64> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::channel_closed(&self.queue_name));
        }
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        state.messages.push_back(QueuedTicket {
            id,
            payload,
            enqueued_at: Utc::now(),
            visible_at: None,
            receive_count: 0,
        });
        Ok(id)
    }

    /// Tickets not yet acknowledged, visible or not
    pub async fn pending(&self) -> usize {
        self.state.read().await.messages.len()
    }

    pub fn acknowledged(&self) -> u64 {
        self.total_acked.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketSource for InMemoryTicketQueue {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn receive(
        &self,
        max: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<InboundTicket>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::channel_closed(&self.queue_name));
        }

        let now = Utc::now();
        let visible_until = now
            + chrono::Duration::from_std(visibility_timeout)
                .map_err(|e| MessagingError::configuration("visibility_timeout", e.to_string()))?;

        let mut state = self.state.write().await;
        let mut received = Vec::new();
        for msg in state.messages.iter_mut() {
            if received.len() >= max {
                break;
            }
            if msg.visible_at.map_or(true, |vt| vt <= now) {
                msg.visible_at = Some(visible_until);
                msg.receive_count += 1;
                received.push(InboundTicket::from_payload(
                    msg.id,
                    &self.queue_name,
                    msg.payload.clone(),
                    msg.receive_count,
                    msg.enqueued_at,
                ));
            }
        }
        Ok(received)
    }

    async fn acknowledge(&self, receipt: i64) -> MessagingResult<()> {
        let mut state = self.state.write().await;
        match state.messages.iter().position(|m| m.id == receipt) {
            Some(pos) => {
                state.messages.remove(pos);
                self.total_acked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(MessagingError::queue_operation(
                &self.queue_name,
                "acknowledge",
                format!("no pending ticket with receipt {receipt}"),
            )),
        }
    }

    async fn close(&self) -> MessagingResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Result channel collecting published reports
#[derive(Debug)]
pub struct InMemoryResultChannel {
    channel_name: String,
    reports: parking_lot::Mutex<Vec<OutcomeReport>>,
    published: Notify,
    fail_publishes: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryResultChannel {
    pub fn new(channel_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            reports: parking_lot::Mutex::new(Vec::new()),
            published: Notify::new(),
            fail_publishes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Reject every publish until switched off again
    pub fn set_failing(&self, failing: bool) {
        self.fail_publishes.store(failing, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<OutcomeReport> {
        self.reports.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` reports were published or `timeout` elapses
    pub async fn wait_for_reports(&self, count: usize, timeout: Duration) -> Vec<OutcomeReport> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.published.notified();
            let reports = self.reports();
            if reports.len() >= count {
                return reports;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.reports();
            }
        }
    }
}

#[async_trait]
impl ResultPublisher for InMemoryResultChannel {
    fn channel_name(&self) -> &str {
        &self.channel_name
    }

    async fn publish(&self, report: &OutcomeReport) -> MessagingResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::channel_closed(&self.channel_name));
        }
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(MessagingError::queue_operation(
                &self.channel_name,
                "publish",
                "publishing disabled",
            ));
        }
        self.reports.lock().push(report.clone());
        self.published.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> MessagingResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
