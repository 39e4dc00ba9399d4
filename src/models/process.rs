//! # Process Model
//!
//! A document travelling through its ordered task sequence. The core only needs the identity,
//! the completion marker and the free-form properties that tickets may override.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub process_id: i64,
    pub title: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Process {
    pub fn new(process_id: i64, title: impl Into<String>) -> Self {
        Self {
            process_id,
            title: title.into(),
            completed: false,
            completed_at: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}
