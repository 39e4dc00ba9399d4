use crate::constants::fields;
use crate::ticket::{TicketError, TicketResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Actions a ticket can request on a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskAction {
    /// Take an open task into work
    Process,
    /// Report a problem; locks the task and records an error comment
    ErrorOpen,
    /// Resolve a previously reported problem and reopen the task
    ErrorClose,
    /// Finish the task and open the next one
    Close,
    /// Attach an informational comment without touching the status
    Comment,
}

impl TaskAction {
    pub const ALL: [TaskAction; 5] = [
        Self::Process,
        Self::ErrorOpen,
        Self::ErrorClose,
        Self::Close,
        Self::Comment,
    ];

    /// Wire name of the action as it appears in ticket field maps
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "PROCESS",
            Self::ErrorOpen => "ERROR_OPEN",
            Self::ErrorClose => "ERROR_CLOSE",
            Self::Close => "CLOSE",
            Self::Comment => "COMMENT",
        }
    }

    /// Check if this action can change the status of a task
    pub fn is_transition(&self) -> bool {
        !matches!(self, Self::Comment)
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskAction {
    type Err = String;

    /// Parsing is case-insensitive and ignores surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| format!("Unknown task action: {s}"))
    }
}

/// Validated, typed view of one inbound instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTicket {
    pub task_id: i64,
    pub action: TaskAction,
    pub correction_task_id: Option<i64>,
    pub message: Option<String>,
    /// Process property overrides written together with the transition
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ActionTicket {
    pub fn new(task_id: i64, action: TaskAction) -> Self {
        Self {
            task_id,
            action,
            correction_task_id: None,
            message: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_correction_task(mut self, correction_task_id: i64) -> Self {
        self.correction_task_id = Some(correction_task_id);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Check requirements that depend on the action
    pub fn validate(&self) -> TicketResult<()> {
        let has_message = self
            .message
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty());
        if self.action == TaskAction::Comment && !has_message {
            return Err(TicketError::missing_field(fields::MESSAGE));
        }
        Ok(())
    }
}
