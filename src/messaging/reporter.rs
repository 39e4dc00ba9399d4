//! # Result Reporter
//!
//! Publishes exactly one outcome report per ticket. Without a results channel, or when
//! publishing fails, the report is written to the operational log instead. Reporting never
//! fails.

use super::channel::ResultPublisher;
use super::message::{OutcomeReport, ReportLevel};
use crate::constants::operations;
use crate::logging::log_error;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ResultReporter {
    publisher: Option<Arc<dyn ResultPublisher>>,
}

impl ResultReporter {
    pub fn new(publisher: Arc<dyn ResultPublisher>) -> Self {
        Self {
            publisher: Some(publisher),
        }
    }

    /// Reporter writing only to the operational log
    pub fn log_only() -> Self {
        Self { publisher: None }
    }

    pub fn has_channel(&self) -> bool {
        self.publisher.is_some()
    }

    pub async fn report(&self, outcome: &OutcomeReport) {
        let Some(publisher) = &self.publisher else {
            Self::log_report(outcome);
            return;
        };

        if let Err(e) = publisher.publish(outcome).await {
            log_error(
                "ResultReporter",
                operations::REPORT,
                &e.to_string(),
                Some(publisher.channel_name()),
            );
            Self::log_report(outcome);
        }
    }

    /// Close the underlying channel, if any
    pub async fn close(&self) {
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.close().await {
                warn!(channel = publisher.channel_name(), error = %e, "Failed to close result channel");
            }
        }
    }

    fn log_report(outcome: &OutcomeReport) {
        let message = outcome.message.as_deref().unwrap_or("");
        let id = outcome.id.as_deref().unwrap_or("null");
        match outcome.level {
            ReportLevel::Success | ReportLevel::Info => info!(
                timestamp = %outcome.timestamp.to_rfc3339(),
                queue = %outcome.queue,
                id = %id,
                level = %outcome.level,
                message = %message,
                "📣 OUTCOME_REPORT"
            ),
            ReportLevel::Warn => warn!(
                timestamp = %outcome.timestamp.to_rfc3339(),
                queue = %outcome.queue,
                id = %id,
                level = %outcome.level,
                message = %message,
                "📣 OUTCOME_REPORT"
            ),
            ReportLevel::Error | ReportLevel::Fatal => error!(
                timestamp = %outcome.timestamp.to_rfc3339(),
                queue = %outcome.queue,
                id = %id,
                level = %outcome.level,
                message = %message,
                "📣 OUTCOME_REPORT"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryResultChannel;

    fn report() -> OutcomeReport {
        OutcomeReport::success("task_actions", Some("42".to_string()), None)
    }

    #[tokio::test]
    async fn test_publishes_to_channel() {
        let channel = Arc::new(InMemoryResultChannel::new("results"));
        let reporter = ResultReporter::new(channel.clone());

        reporter.report(&report()).await;
        assert_eq!(channel.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let channel = Arc::new(InMemoryResultChannel::new("results"));
        channel.set_failing(true);
        let reporter = ResultReporter::new(channel.clone());

        reporter.report(&report()).await;
        assert!(channel.reports().is_empty());
    }

    #[tokio::test]
    async fn test_log_only_reporter_never_fails() {
        let reporter = ResultReporter::log_only();
        assert!(!reporter.has_channel());
        reporter.report(&report()).await;
        reporter.close().await;
    }

    #[tokio::test]
    async fn test_close_closes_channel() {
        let channel = Arc::new(InMemoryResultChannel::new("results"));
        ResultReporter::new(channel.clone()).close().await;
        assert!(channel.is_closed());
    }
}
