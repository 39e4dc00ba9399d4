//! Ticket consumer against the in-memory queue

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use taskline_core::dispatch::{ConsumerConfig, TicketConsumer};
use taskline_core::messaging::{InMemoryTicketQueue, TicketSource};
use taskline_core::state_machine::TaskStatus::{Done, InWork, Locked, Open};
use taskline_core::ReportLevel;

fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        max_workers: 4,
        batch_size: 10,
        poll_interval: Duration::from_millis(10),
        visibility_timeout: Duration::from_secs(30),
    }
}

fn consumer_for(
    harness: &DispatchHarness,
    queue: &Arc<InMemoryTicketQueue>,
    config: ConsumerConfig,
) -> TicketConsumer {
    TicketConsumer::new(queue.clone(), Arc::clone(&harness.dispatcher), config)
}

#[tokio::test]
async fn test_every_ticket_reported_and_acknowledged() {
    let harness = DispatchHarness::new([Done, Done, Open, Locked, Locked]);
    let queue = Arc::new(InMemoryTicketQueue::new(TICKET_QUEUE));
    let consumer = consumer_for(&harness, &queue, consumer_config());

    queue.send(json!({"id": 42, "action": "PROCESS"})).await.unwrap();
    queue.send(json!({"id": 7, "action": "PROCESS"})).await.unwrap();
    queue.send(json!({"action": "PROCESS"})).await.unwrap();
    queue.send(json!("not an object")).await.unwrap();

    assert_eq!(consumer.poll_once().await.unwrap(), 4);
    consumer.drain().await;

    let stats = consumer.stats();
    assert_eq!(stats.received, 4);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.acknowledged, 4);
    assert_eq!(stats.left_for_redelivery, 0);

    assert_eq!(queue.pending().await, 0);
    assert_eq!(harness.results.reports().len(), 4);
    assert_eq!(harness.status(42), InWork);
}

#[tokio::test]
async fn test_transient_failure_left_for_redelivery() {
    let harness = DispatchHarness::new([Done, Done, Open, Locked, Locked]);
    let queue = Arc::new(InMemoryTicketQueue::new(TICKET_QUEUE));
    let consumer = consumer_for(
        &harness,
        &queue,
        ConsumerConfig {
            visibility_timeout: Duration::ZERO,
            ..consumer_config()
        },
    );

    queue.send(json!({"id": 42, "action": "PROCESS"})).await.unwrap();
    harness.store.fail_next_commit();

    consumer.poll_once().await.unwrap();
    consumer.drain().await;

    let stats = consumer.stats();
    assert_eq!(stats.left_for_redelivery, 1);
    assert_eq!(stats.acknowledged, 0);
    assert_eq!(queue.pending().await, 1);
    assert_eq!(harness.status(42), Open);
    assert_eq!(harness.results.reports()[0].level, ReportLevel::Fatal);

    // the redelivered ticket goes through once the store recovers
    consumer.poll_once().await.unwrap();
    consumer.drain().await;

    assert_eq!(consumer.stats().acknowledged, 1);
    assert_eq!(queue.pending().await, 0);
    assert_eq!(harness.status(42), InWork);
}

#[tokio::test]
async fn test_unacknowledged_ticket_hidden_until_visibility_timeout() {
    let harness = DispatchHarness::new([Done, Done, Open, Locked, Locked]);
    let queue = Arc::new(InMemoryTicketQueue::new(TICKET_QUEUE));
    let consumer = consumer_for(&harness, &queue, consumer_config());

    queue.send(json!({"id": 42, "action": "PROCESS"})).await.unwrap();
    harness.store.fail_next_commit();

    consumer.poll_once().await.unwrap();
    consumer.drain().await;

    assert_eq!(consumer.poll_once().await.unwrap(), 0);
    assert_eq!(queue.pending().await, 1);
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let harness = DispatchHarness::new([Done, Done, InWork, Locked, Locked]);
    let queue = Arc::new(InMemoryTicketQueue::new(TICKET_QUEUE));
    let consumer = Arc::new(consumer_for(&harness, &queue, consumer_config()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move { consumer.run(shutdown_rx).await })
    };

    queue
        .send(json!({"id": 42, "action": "COMMENT", "message": "cover is loose"}))
        .await
        .unwrap();
    queue.send(json!({"id": 42, "action": "CLOSE"})).await.unwrap();

    let reports = harness
        .results
        .wait_for_reports(2, Duration::from_secs(5))
        .await;
    assert_eq!(reports.len(), 2);

    shutdown_tx.send(true).unwrap();
    running.await.unwrap().unwrap();

    assert_eq!(consumer.stats().acknowledged, 2);
    assert_eq!(queue.pending().await, 0);
    assert_eq!(consumer.available_workers(), 4);

    queue.close().await.unwrap();
    assert!(queue.is_closed());
}

#[tokio::test]
async fn test_closed_queue_rejects_sends() {
    let queue = InMemoryTicketQueue::new(TICKET_QUEUE);
    queue.close().await.unwrap();

    assert!(queue.send(json!({"id": 42, "action": "PROCESS"})).await.is_err());
    assert!(queue.receive(1, Duration::from_secs(1)).await.is_err());
}
