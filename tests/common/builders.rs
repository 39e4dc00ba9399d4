//! Seeded stores and dispatchers shared by the integration tests

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use taskline_core::dispatch::{
    ActionDispatcher, AllowAll, Authorizer, DispatchContext, RecordingIndexSink,
};
use taskline_core::messaging::{InMemoryResultChannel, OutcomeReport, ResultReporter};
use taskline_core::models::{Process, Task};
use taskline_core::store::InMemoryWorkflowStore;
use taskline_core::TaskStatus;

pub const TICKET_QUEUE: &str = "task_actions";
pub const PROCESS_ID: i64 = 1;
pub const FINISHED_PROCESS_ID: i64 = 2;
/// Only task of the finished process, already DONE
pub const FINISHED_TASK_ID: i64 = 7;

/// Task id of `ordinal` within process 1; ordinal 3 is task 42
pub fn task_id(ordinal: i32) -> i64 {
    39 + ordinal as i64
}

/// Process 1 with five tasks in the given statuses plus the finished process 2
pub fn seeded_store(statuses: [TaskStatus; 5]) -> Arc<InMemoryWorkflowStore> {
    let store = Arc::new(InMemoryWorkflowStore::new());
    seed(&store, statuses);
    store
}

pub fn seed(store: &InMemoryWorkflowStore, statuses: [TaskStatus; 5]) {
    let tasks = statuses
        .iter()
        .enumerate()
        .map(|(i, status)| {
            let ordinal = i as i32 + 1;
            Task::new(task_id(ordinal), PROCESS_ID, format!("Step {ordinal}"), ordinal)
                .with_status(*status)
        })
        .collect();
    store.insert_process(
        Process::new(PROCESS_ID, "Digitisation of Monograph 1887"),
        tasks,
    );
    store.insert_process(
        Process::new(FINISHED_PROCESS_ID, "Finished Monograph"),
        vec![Task::new(FINISHED_TASK_ID, FINISHED_PROCESS_ID, "Export", 1)
            .with_status(TaskStatus::Done)],
    );
}

/// Turn a JSON object literal into ticket fields
pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("ticket must be a JSON object, got {other}"),
    }
}

pub struct DispatchHarness {
    pub store: Arc<InMemoryWorkflowStore>,
    pub results: Arc<InMemoryResultChannel>,
    pub index: Arc<RecordingIndexSink>,
    pub dispatcher: Arc<ActionDispatcher>,
}

impl DispatchHarness {
    pub fn new(statuses: [TaskStatus; 5]) -> Self {
        Self::with_authorizer(statuses, Arc::new(AllowAll))
    }

    pub fn with_authorizer(statuses: [TaskStatus; 5], authorizer: Arc<dyn Authorizer>) -> Self {
        Self::from_store(seeded_store(statuses), authorizer)
    }

    pub fn from_store(store: Arc<InMemoryWorkflowStore>, authorizer: Arc<dyn Authorizer>) -> Self {
        let results = Arc::new(InMemoryResultChannel::new("task_action_results"));
        let index = Arc::new(RecordingIndexSink::new());
        let dispatcher = ActionDispatcher::builder(store.clone())
            .authorizer(authorizer)
            .index_sink(index.clone())
            .reporter(ResultReporter::new(results.clone()))
            .store_timeout(Duration::from_secs(1))
            .build();

        Self {
            store,
            results,
            index,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Dispatch a ticket as if it arrived on the ticket queue
    pub async fn send(&self, ticket: Value) -> OutcomeReport {
        self.dispatcher
            .dispatch(&fields(ticket), &DispatchContext::for_channel(TICKET_QUEUE))
            .await
    }

    pub fn status(&self, task_id: i64) -> TaskStatus {
        self.store
            .task(task_id)
            .map(|task| task.status)
            .unwrap_or_else(|| panic!("task {task_id} not seeded"))
    }
}
