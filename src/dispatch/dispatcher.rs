//! # Action Dispatcher
//!
//! Entry point for every ticket, whether it came over a channel or from a direct call.
//!
//! 1. Read the ticket (channel tickets only) and resolve its task
//! 2. Establish the acting identity and check authorization
//! 3. Hand the ticket to the [`TaskStateMachine`]
//! 4. Reindex the touched task and process, best effort
//!
//! [`ActionDispatcher::execute`] returns a typed [`Result`](crate::Result) to synchronous
//! callers. [`ActionDispatcher::dispatch`] converges every path, including panics, on exactly
//! one [`OutcomeReport`] which it hands to the [`ResultReporter`].

use super::identity::{AllowAll, Authorizer, IdentityProvider, SystemIdentityProvider};
use super::index_sink::{IndexSink, NoopIndexSink};
use crate::constants::operations;
use crate::error::{Result, TasklineError};
use crate::logging::log_ticket_operation;
use crate::messaging::{OutcomeReport, ReportLevel, ResultReporter};
use crate::models::{Identity, Task};
use crate::state_machine::{
    ActionTicket, TaskEditType, TaskStateMachine, TransitionContext, TransitionOutcome,
};
use crate::store::{with_timeout, WorkflowStore};
use crate::ticket::TicketReader;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a ticket came from and who, if anyone, is calling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    /// Channel name echoed into the outcome report
    pub channel: String,
    pub edit_type: TaskEditType,
    /// Caller identity; `None` uses the configured acting identity
    pub identity: Option<Identity>,
}

impl DispatchContext {
    /// Ticket received from a message channel
    pub fn for_channel(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            edit_type: TaskEditType::Queue,
            identity: None,
        }
    }

    /// Direct call on behalf of a user
    pub fn interactive(identity: Identity) -> Self {
        Self {
            channel: "direct".to_string(),
            edit_type: TaskEditType::Manual,
            identity: Some(identity),
        }
    }

    pub fn with_edit_type(mut self, edit_type: TaskEditType) -> Self {
        self.edit_type = edit_type;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    store: Arc<dyn WorkflowStore>,
    state_machine: TaskStateMachine,
    identity_provider: Arc<dyn IdentityProvider>,
    authorizer: Arc<dyn Authorizer>,
    index_sink: Arc<dyn IndexSink>,
    reporter: ResultReporter,
    store_timeout: Duration,
}

impl ActionDispatcher {
    pub fn builder(store: Arc<dyn WorkflowStore>) -> ActionDispatcherBuilder {
        ActionDispatcherBuilder::new(store)
    }

    pub fn state_machine(&self) -> &TaskStateMachine {
        &self.state_machine
    }

    pub fn reporter(&self) -> &ResultReporter {
        &self.reporter
    }

    /// Read a ticket from its field map and execute it
    pub async fn execute_fields(
        &self,
        fields: &Map<String, Value>,
        ctx: &DispatchContext,
    ) -> Result<TransitionOutcome> {
        let ticket = TicketReader::new(fields).read_ticket()?;
        self.execute(&ticket, ctx).await
    }

    /// Execute a typed ticket
    #[instrument(skip(self, ticket, ctx), fields(task_id = ticket.task_id, action = %ticket.action, channel = %ctx.channel))]
    pub async fn execute(
        &self,
        ticket: &ActionTicket,
        ctx: &DispatchContext,
    ) -> Result<TransitionOutcome> {
        ticket.validate()?;

        let task = self.resolve_task(ticket.task_id).await?;
        let identity = ctx
            .identity
            .clone()
            .unwrap_or_else(|| self.identity_provider.current_acting_identity());

        if !self.authorizer.authorize(&identity, &task, ticket.action) {
            return Err(TasklineError::UnauthorizedAction {
                login: identity.login,
                action: ticket.action,
                task_id: task.task_id,
            });
        }

        let transition = TransitionContext::new(identity, ctx.edit_type);
        let outcome = self.state_machine.apply(ticket, &transition).await?;

        if !outcome.is_noop() {
            self.reindex(&outcome).await;
        }
        Ok(outcome)
    }

    /// Execute a channel ticket and report its outcome; never fails
    #[instrument(skip(self, fields, ctx), fields(channel = %ctx.channel))]
    pub async fn dispatch(&self, fields: &Map<String, Value>, ctx: &DispatchContext) -> OutcomeReport {
        let reader = TicketReader::new(fields);
        let raw_id = reader.raw_id();
        let task_id = reader.read_optional_integer(crate::constants::fields::ID).ok().flatten();
        let action = fields.get(crate::constants::fields::ACTION).and_then(Value::as_str);

        let result = AssertUnwindSafe(self.execute_fields(fields, ctx))
            .catch_unwind()
            .await;

        let report = match result {
            Ok(Ok(outcome)) => {
                log_ticket_operation(
                    operations::DISPATCH,
                    Some(outcome.task_id),
                    Some(outcome.action.as_str()),
                    "success",
                    outcome.note.as_deref(),
                );
                OutcomeReport::success(&ctx.channel, raw_id, outcome.note)
            }
            Ok(Err(error)) => {
                let message = error.report_message();
                log_ticket_operation(
                    operations::DISPATCH,
                    task_id,
                    action,
                    error.kind().as_str(),
                    Some(&message),
                );
                OutcomeReport::failure(
                    &ctx.channel,
                    raw_id,
                    error.report_level(),
                    message,
                    error.is_retryable(),
                )
            }
            Err(_) => {
                warn!(id = ?raw_id, "💥 Ticket handling panicked");
                OutcomeReport::failure(
                    &ctx.channel,
                    raw_id,
                    ReportLevel::Fatal,
                    "Internal: ticket handling panicked",
                    false,
                )
            }
        };

        self.reporter.report(&report).await;
        report
    }

    async fn resolve_task(&self, task_id: i64) -> Result<Task> {
        with_timeout(
            "get_task_by_id",
            self.store_timeout,
            self.store.get_task_by_id(task_id),
        )
        .await?
        .ok_or(TasklineError::TaskNotFound { task_id })
    }

    async fn reindex(&self, outcome: &TransitionOutcome) {
        for task_id in &outcome.touched_task_ids {
            if let Err(e) = self.index_sink.reindex_task(*task_id).await {
                warn!(task_id = task_id, error = %e, operation = operations::REINDEX, "Task reindex failed");
            }
        }
        if let Err(e) = self.index_sink.reindex_process(outcome.process_id).await {
            warn!(process_id = outcome.process_id, error = %e, operation = operations::REINDEX, "Process reindex failed");
        }
        debug!(
            tasks = outcome.touched_task_ids.len(),
            process_id = outcome.process_id,
            "Reindex requested"
        );
    }
}

pub struct ActionDispatcherBuilder {
    store: Arc<dyn WorkflowStore>,
    identity_provider: Arc<dyn IdentityProvider>,
    authorizer: Arc<dyn Authorizer>,
    index_sink: Arc<dyn IndexSink>,
    reporter: ResultReporter,
    store_timeout: Duration,
}

impl ActionDispatcherBuilder {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            store,
            identity_provider: Arc::new(SystemIdentityProvider::default()),
            authorizer: Arc::new(AllowAll),
            index_sink: Arc::new(NoopIndexSink),
            reporter: ResultReporter::log_only(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = provider;
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn index_sink(mut self, sink: Arc<dyn IndexSink>) -> Self {
        self.index_sink = sink;
        self
    }

    pub fn reporter(mut self, reporter: ResultReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn build(self) -> ActionDispatcher {
        let state_machine = TaskStateMachine::new(Arc::clone(&self.store), self.store_timeout);
        ActionDispatcher {
            store: self.store,
            state_machine,
            identity_provider: self.identity_provider,
            authorizer: self.authorizer,
            index_sink: self.index_sink,
            reporter: self.reporter,
            store_timeout: self.store_timeout,
        }
    }
}
