//! # Ticket Consumer
//!
//! Polls a [`TicketSource`] and runs every ticket on its own tokio task, bounded by a
//! semaphore of `max_workers` permits. A ticket is acknowledged once its outcome was reported,
//! unless the failure is retryable; those are left to the transport's redelivery.

use super::dispatcher::{ActionDispatcher, DispatchContext};
use crate::config::TasklineConfig;
use crate::messaging::{InboundTicket, MessagingResult, TicketSource};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub max_workers: usize,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
}

impl ConsumerConfig {
    pub fn from_config(config: &TasklineConfig) -> Self {
        Self {
            max_workers: config.dispatcher.max_workers,
            batch_size: config.messaging.batch_size,
            poll_interval: config.messaging.poll_interval(),
            visibility_timeout: config.messaging.visibility_timeout(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::from_config(&TasklineConfig::default())
    }
}

/// Running counters of the consumer
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    acknowledged: AtomicU64,
    left_for_redelivery: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub acknowledged: u64,
    pub left_for_redelivery: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            acknowledged: self.acknowledged.load(Ordering::SeqCst),
            left_for_redelivery: self.left_for_redelivery.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug)]
pub struct TicketConsumer {
    source: Arc<dyn TicketSource>,
    dispatcher: Arc<ActionDispatcher>,
    config: ConsumerConfig,
    semaphore: Arc<Semaphore>,
    stats: Arc<ConsumerStats>,
    in_flight: Mutex<JoinSet<()>>,
}

impl TicketConsumer {
    pub fn new(
        source: Arc<dyn TicketSource>,
        dispatcher: Arc<ActionDispatcher>,
        config: ConsumerConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            source,
            dispatcher,
            config,
            semaphore,
            stats: Arc::new(ConsumerStats::default()),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Free worker slots
    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Receive one batch and spawn a worker per ticket; returns the batch size
    pub async fn poll_once(&self) -> MessagingResult<usize> {
        let tickets = self
            .source
            .receive(self.config.batch_size, self.config.visibility_timeout)
            .await?;
        let count = tickets.len();

        for ticket in tickets {
            // waits while every worker is busy
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                warn!("Worker pool closed, dropping ticket for redelivery");
                break;
            };
            self.stats.received.fetch_add(1, Ordering::SeqCst);

            let source = Arc::clone(&self.source);
            let dispatcher = Arc::clone(&self.dispatcher);
            let stats = Arc::clone(&self.stats);

            let mut in_flight = self.in_flight.lock().await;
            while let Some(finished) = in_flight.try_join_next() {
                log_worker_exit(finished);
            }
            in_flight.spawn(async move {
                handle_ticket(source, dispatcher, stats, ticket).await;
                drop(permit);
            });
        }

        Ok(count)
    }

    /// Poll until `shutdown` flips to `true`, then wait for in-flight tickets
    #[instrument(skip(self, shutdown), fields(queue = %self.source.queue_name()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> MessagingResult<()> {
        info!(
            max_workers = self.config.max_workers,
            batch_size = self.config.batch_size,
            "🚀 Ticket consumer started"
        );

        while !*shutdown.borrow() {
            let idle = match self.poll_once().await {
                Ok(count) => count == 0,
                Err(e) => {
                    error!(error = %e, "❌ Failed to receive tickets");
                    true
                }
            };

            if idle {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("🛑 Ticket consumer stopping, draining in-flight tickets");
        self.drain().await;
        info!(stats = ?self.stats(), "✅ Ticket consumer stopped");
        Ok(())
    }

    /// Wait for every spawned ticket to finish
    pub async fn drain(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(finished) = in_flight.join_next().await {
            log_worker_exit(finished);
        }
    }
}

async fn handle_ticket(
    source: Arc<dyn TicketSource>,
    dispatcher: Arc<ActionDispatcher>,
    stats: Arc<ConsumerStats>,
    ticket: InboundTicket,
) {
    let ctx = DispatchContext::for_channel(&ticket.queue);
    let report = dispatcher.dispatch(&ticket.fields, &ctx).await;

    if report.is_success() {
        stats.succeeded.fetch_add(1, Ordering::SeqCst);
    } else {
        stats.failed.fetch_add(1, Ordering::SeqCst);
    }

    if report.retryable {
        stats.left_for_redelivery.fetch_add(1, Ordering::SeqCst);
        debug!(
            receipt = ticket.receipt,
            delivery_count = ticket.delivery_count,
            "Retryable failure, leaving ticket for redelivery"
        );
        return;
    }

    match source.acknowledge(ticket.receipt).await {
        Ok(()) => {
            stats.acknowledged.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => {
            error!(receipt = ticket.receipt, error = %e, "❌ Failed to acknowledge ticket");
        }
    }
}

fn log_worker_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "❌ Ticket worker terminated abnormally");
    }
}
