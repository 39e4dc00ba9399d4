//! # Taskline Worker
//!
//! Consumes action tickets from the configured queue until Ctrl+C or SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! TASKLINE_CONFIG_PATH=config/taskline.toml cargo run --bin taskline-worker
//!
//! # Override single settings
//! TASKLINE_DISPATCHER__MAX_WORKERS=16 cargo run --bin taskline-worker
//! ```

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use taskline_core::config::{ConfigLoader, MessagingBackend, TasklineConfig};
use taskline_core::dispatch::{
    ActionDispatcher, ConsumerConfig, SystemIdentityProvider, TicketConsumer,
};
use taskline_core::logging;
use taskline_core::messaging::{
    pgmq, InMemoryTicketQueue, PgmqResultPublisher, PgmqTicketSource, ResultPublisher,
    ResultReporter, TicketSource,
};
use taskline_core::store::{InMemoryWorkflowStore, PgWorkflowStore, WorkflowStore};

struct Wiring {
    store: Arc<dyn WorkflowStore>,
    source: Arc<dyn TicketSource>,
    publisher: Option<Arc<dyn ResultPublisher>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    logging::init_structured_logging(&config.logging);

    info!("🚀 Starting Taskline Worker...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!("   Backend: {:?}", config.messaging.backend);
    info!("   Ticket queue: {}", config.messaging.ticket_queue);
    info!(
        "   Results queue: {}",
        config
            .messaging
            .results_queue
            .as_deref()
            .unwrap_or("(operational log)")
    );

    let wiring = wire(&config).await?;

    let reporter = match wiring.publisher {
        Some(publisher) => ResultReporter::new(publisher),
        None => ResultReporter::log_only(),
    };
    let dispatcher = ActionDispatcher::builder(wiring.store)
        .identity_provider(Arc::new(SystemIdentityProvider::from_config(
            &config.dispatcher.system_identity,
        )))
        .reporter(reporter.clone())
        .store_timeout(config.dispatcher.store_timeout())
        .build();

    let consumer = TicketConsumer::new(
        Arc::clone(&wiring.source),
        Arc::new(dispatcher),
        ConsumerConfig::from_config(&config),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown signal received, initiating graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    info!("   Press Ctrl+C to shutdown gracefully");
    if let Err(e) = consumer.run(shutdown_rx).await {
        error!("Consumer stopped with error: {}", e);
    }
    signal_task.abort();

    if let Err(e) = wiring.source.close().await {
        error!("Failed to close ticket source cleanly: {}", e);
    }
    reporter.close().await;

    info!("👋 Taskline Worker shutdown complete");
    Ok(())
}

async fn wire(config: &TasklineConfig) -> anyhow::Result<Wiring> {
    match config.messaging.backend {
        MessagingBackend::InMemory => {
            info!("🔧 Using in-memory store and ticket queue");
            Ok(Wiring {
                store: Arc::new(InMemoryWorkflowStore::new()),
                source: Arc::new(InMemoryTicketQueue::new(&config.messaging.ticket_queue)),
                publisher: None,
            })
        }
        MessagingBackend::Pgmq => {
            info!("🔧 Connecting to PostgreSQL...");
            let store = PgWorkflowStore::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            store.migrate().await.context("Failed to run migrations")?;
            let pool = store.pool().clone();

            pgmq::ensure_queue(&pool, &config.messaging.ticket_queue).await?;
            let publisher: Option<Arc<dyn ResultPublisher>> = match &config.messaging.results_queue {
                Some(queue) => {
                    pgmq::ensure_queue(&pool, queue).await?;
                    Some(Arc::new(PgmqResultPublisher::new(pool.clone(), queue)))
                }
                None => None,
            };

            Ok(Wiring {
                store: Arc::new(store),
                source: Arc::new(PgmqTicketSource::new(pool, &config.messaging.ticket_queue)),
                publisher,
            })
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
