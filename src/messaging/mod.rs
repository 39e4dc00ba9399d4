//! # Messaging
//!
//! Ticket and result channels, the message types they carry, and the result reporter.

pub mod channel;
pub mod errors;
pub mod in_memory;
pub mod message;
pub mod pgmq;
pub mod reporter;

pub use channel::{ResultPublisher, TicketSource};
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::{InMemoryResultChannel, InMemoryTicketQueue};
pub use message::{InboundTicket, OutcomeReport, ReportLevel};
pub use pgmq::{PgmqResultPublisher, PgmqTicketSource};
pub use reporter::ResultReporter;
