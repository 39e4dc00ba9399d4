//! Channel contracts.
//!
//! Only the consumer and the reporter talk to these; the state machine and ledger never see a
//! transport. Channels are constructed explicitly, injected, and closed by their owner.

use super::errors::MessagingResult;
use super::message::{InboundTicket, OutcomeReport};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Inbound ticket channel with at-least-once delivery
#[async_trait]
pub trait TicketSource: Send + Sync + Debug {
    fn queue_name(&self) -> &str;

    /// Take up to `max` visible tickets, hiding them for `visibility_timeout`
    async fn receive(
        &self,
        max: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<InboundTicket>>;

    /// Remove a handled ticket; unacknowledged tickets are redelivered
    async fn acknowledge(&self, receipt: i64) -> MessagingResult<()>;

    async fn close(&self) -> MessagingResult<()>;
}

/// Outbound channel for outcome reports
#[async_trait]
pub trait ResultPublisher: Send + Sync + Debug {
    fn channel_name(&self) -> &str;

    async fn publish(&self, report: &OutcomeReport) -> MessagingResult<()>;

    async fn close(&self) -> MessagingResult<()>;
}
