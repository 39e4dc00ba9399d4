//! # Taskline Configuration
//!
//! Layered configuration: serde defaults, then an optional TOML file, then `TASKLINE_`
//! environment variables (`__` separates nested keys).
//!
//! ```rust,no_run
//! use taskline_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! let workers = config.dispatcher.max_workers;
//! let queue = &config.messaging.ticket_queue;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::models::Identity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TasklineConfig {
    pub database: DatabaseConfig,
    pub messaging: MessagingConfig,
    pub dispatcher: DispatcherConfig,
    pub logging: LoggingConfig,
}

impl TasklineConfig {
    /// Reject configurations the runtime cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dispatcher.max_workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatcher.max_workers",
                "0",
                "at least one worker is required",
            ));
        }
        if self.dispatcher.store_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatcher.store_timeout_ms",
                "0",
                "store calls need a positive timeout",
            ));
        }
        if self.dispatcher.system_identity.login.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "login",
                "dispatcher.system_identity",
            ));
        }
        if self.messaging.ticket_queue.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "ticket_queue",
                "messaging",
            ));
        }
        if let Some(results) = &self.messaging.results_queue {
            if results.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "messaging.results_queue",
                    results.clone(),
                    "omit the key to fall back to the local log",
                ));
            }
        }
        if self.messaging.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "messaging.batch_size",
                "0",
                "must read at least one ticket per poll",
            ));
        }
        if self.messaging.backend == MessagingBackend::Pgmq && self.database.url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "url",
                "database (required by the pgmq backend)",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/taskline_development".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessagingBackend {
    InMemory,
    Pgmq,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MessagingConfig {
    pub backend: MessagingBackend,
    /// Queue carrying inbound action tickets
    pub ticket_queue: String,
    /// Queue receiving outcome reports; `None` reports to the local log
    pub results_queue: Option<String>,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub visibility_timeout_seconds: u64,
}

impl MessagingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            backend: MessagingBackend::InMemory,
            ticket_queue: "task_actions".to_string(),
            results_queue: None,
            batch_size: 10,
            poll_interval_ms: 250,
            visibility_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Size of the ticket worker pool
    pub max_workers: usize,
    pub store_timeout_ms: u64,
    /// Acting identity for tickets without an interactive caller
    pub system_identity: SystemIdentityConfig,
}

impl DispatcherConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            store_timeout_ms: 5_000,
            system_identity: SystemIdentityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SystemIdentityConfig {
    pub login: String,
    pub display_name: String,
    pub groups: Vec<String>,
}

impl SystemIdentityConfig {
    pub fn to_identity(&self) -> Identity {
        Identity::new(&self.login, &self.display_name).with_groups(self.groups.iter().cloned())
    }
}

impl Default for SystemIdentityConfig {
    fn default() -> Self {
        Self {
            login: "taskline".to_string(),
            display_name: "Taskline System".to_string(),
            groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
