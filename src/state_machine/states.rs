use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing status of a task within its process
///
/// The numeric values mirror the persisted ordering (`LOCKED` < `OPEN` < `INWORK` < `DONE`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TaskStatus {
    /// Waiting for an earlier task to finish
    #[default]
    #[serde(rename = "LOCKED")]
    Locked,
    /// Ready to be taken into work
    #[serde(rename = "OPEN")]
    Open,
    /// Currently being worked on by an assigned user
    #[serde(rename = "INWORK")]
    InWork,
    /// Finished
    #[serde(rename = "DONE")]
    Done,
}

impl TaskStatus {
    /// Numeric value used for persistence and ordering
    pub fn value(&self) -> i16 {
        match self {
            Self::Locked => 0,
            Self::Open => 1,
            Self::InWork => 2,
            Self::Done => 3,
        }
    }

    /// Resolve a status from its numeric value
    pub fn from_value(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Locked),
            1 => Some(Self::Open),
            2 => Some(Self::InWork),
            3 => Some(Self::Done),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if the task counts as the "current" task of its process
    pub fn is_current(&self) -> bool {
        matches!(self, Self::Open | Self::InWork)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::Open => "OPEN",
            Self::InWork => "INWORK",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCKED" => Ok(Self::Locked),
            "OPEN" => Ok(Self::Open),
            "INWORK" => Ok(Self::InWork),
            "DONE" => Ok(Self::Done),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Who or what caused the last transition of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEditType {
    /// Interactive edit by a single user
    Manual,
    /// Triggered by the workflow itself (automatic tasks, cascades)
    #[default]
    Automatic,
    /// Driven by a ticket from the message channel
    Queue,
    /// Administrative override
    Admin,
}

impl TaskEditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
            Self::Queue => "queue",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for TaskEditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskEditType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "automatic" => Ok(Self::Automatic),
            "queue" => Ok(Self::Queue),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid task edit type: {s}")),
        }
    }
}
