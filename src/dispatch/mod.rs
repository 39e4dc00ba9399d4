//! # Dispatch
//!
//! Ticket dispatching and the channel consumer that feeds it, plus the identity,
//! authorization and index seams the dispatcher depends on.

pub mod consumer;
pub mod dispatcher;
pub mod identity;
pub mod index_sink;

pub use consumer::{ConsumerConfig, ConsumerStats, ConsumerStatsSnapshot, TicketConsumer};
pub use dispatcher::{ActionDispatcher, ActionDispatcherBuilder, DispatchContext};
pub use identity::{AllowAll, Authorizer, GroupAuthorizer, IdentityProvider, SystemIdentityProvider};
pub use index_sink::{IndexError, IndexSink, NoopIndexSink, RecordingIndexSink};
