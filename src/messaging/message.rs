//! # Channel Message Structures
//!
//! Inbound tickets as delivered by a ticket source, and the outcome reports published for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// A ticket as received from a channel, before it is read
#[derive(Debug, Clone, PartialEq)]
pub struct InboundTicket {
    /// Transport handle used to acknowledge the ticket
    pub receipt: i64,
    pub queue: String,
    pub fields: Map<String, Value>,
    /// Number of times the transport has handed out this ticket
    pub delivery_count: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl InboundTicket {
    /// Wrap a raw payload; anything other than a JSON object carries no fields
    pub fn from_payload(
        receipt: i64,
        queue: impl Into<String>,
        payload: Value,
        delivery_count: i32,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        let fields = match payload {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        Self {
            receipt,
            queue: queue.into(),
            fields,
            delivery_count,
            enqueued_at,
        }
    }
}

/// Severity of an outcome report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportLevel {
    Success,
    Info,
    Warn,
    Error,
    Fatal,
}

impl ReportLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }
}

impl fmt::Display for ReportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single report produced for every ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub report_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Channel the ticket arrived on
    pub queue: String,
    /// Raw `id` field of the ticket
    pub id: Option<String>,
    pub level: ReportLevel,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    /// Whether a redelivery of the ticket may succeed; never published
    #[serde(skip, default)]
    pub retryable: bool,
}

impl OutcomeReport {
    pub fn success(queue: impl Into<String>, id: Option<String>, message: Option<String>) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            queue: queue.into(),
            id,
            level: ReportLevel::Success,
            message,
            retryable: false,
        }
    }

    pub fn failure(
        queue: impl Into<String>,
        id: Option<String>,
        level: ReportLevel,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            queue: queue.into(),
            id,
            level,
            message: Some(message.into()),
            retryable,
        }
    }

    pub fn is_success(&self) -> bool {
        self.level == ReportLevel::Success
    }
}
