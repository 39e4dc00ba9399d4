#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Taskline Core
//!
//! Task workflow state machine and asynchronous action processing for digitization
//! production workflows.
//!
//! A process (a digitized document) moves through an ordered sequence of tasks. External
//! instructions ("tickets") arrive over a message channel or a direct call, are validated,
//! applied to the task's status under a per-process lock, and answered with exactly one
//! outcome report.
//!
//! ## Module Organization
//!
//! - [`ticket`] - Typed reading of inbound ticket field maps
//! - [`ledger`] - Correction ledger of INFO and ERROR comments
//! - [`state_machine`] - Task status transitions and their side effects
//! - [`dispatch`] - Action dispatcher and channel consumer
//! - [`messaging`] - Ticket and result channels, result reporter
//! - [`store`] - Task/process store contract with in-memory and PostgreSQL adapters
//! - [`config`] - Layered configuration
//! - [`error`] - Crate-level error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskline_core::dispatch::{ActionDispatcher, DispatchContext};
//! use taskline_core::models::{Process, Task};
//! use taskline_core::state_machine::{ActionTicket, TaskAction, TaskStatus};
//! use taskline_core::store::InMemoryWorkflowStore;
//!
//! # async fn example() -> taskline_core::Result<()> {
//! let store = Arc::new(InMemoryWorkflowStore::new());
//! store.insert_process(
//!     Process::new(1, "Monograph"),
//!     vec![Task::new(42, 1, "Scanning", 1).with_status(TaskStatus::Open)],
//! );
//!
//! let dispatcher = ActionDispatcher::builder(store).build();
//! let outcome = dispatcher
//!     .execute(
//!         &ActionTicket::new(42, TaskAction::Process),
//!         &DispatchContext::for_channel("task_actions"),
//!     )
//!     .await?;
//! assert_eq!(outcome.to, TaskStatus::InWork);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod state_machine;
pub mod store;
pub mod ticket;

pub use dispatch::{ActionDispatcher, DispatchContext, TicketConsumer};
pub use error::{ErrorKind, Result, TasklineError};
pub use ledger::CorrectionLedger;
pub use messaging::{OutcomeReport, ReportLevel, ResultReporter};
pub use state_machine::{ActionTicket, TaskAction, TaskStateMachine, TaskStatus};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
