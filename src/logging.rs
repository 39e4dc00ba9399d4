//! # Structured Logging Module
//!
//! Console logging for the ticket worker, either human-readable or JSON lines.
//! `RUST_LOG` wins over the configured level; an empty configured level falls back to a
//! default chosen from `TASKLINE_ENV`.

use crate::config::{LogFormat, LoggingConfig};
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let level = if config.level.trim().is_empty() {
            get_log_level(&environment)
        } else {
            config.level.clone()
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed(),
        };

        // A subscriber installed by an embedding host stays in place
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            level = %level,
            format = ?config.format,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("TASKLINE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for ticket handling
pub fn log_ticket_operation(
    operation: &str,
    task_id: Option<i64>,
    action: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = task_id,
        action = action,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🎫 TICKET_OPERATION"
    );
}

/// Log a committed task status change
pub fn log_transition(task_id: i64, process_id: i64, action: &str, from: &str, to: &str) {
    tracing::info!(
        task_id = task_id,
        process_id = process_id,
        action = %action,
        from_status = %from,
        to_status = %to,
        timestamp = %Utc::now().to_rfc3339(),
        "🔄 TASK_TRANSITION"
    );
}

/// Log structured data for store operations
pub fn log_store_operation(
    operation: &str,
    record_id: Option<i64>,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        record_id = record_id,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 STORE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
