//! # Ticket Reader
//!
//! Typed access to the flat field map of an inbound instruction. Reading is pure: every
//! rejection happens here, before a task is looked up or a lock is taken.

pub mod errors;
pub mod reader;

pub use errors::{TicketError, TicketResult};
pub use reader::TicketReader;
