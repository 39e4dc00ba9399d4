//! # System Constants
//!
//! Field names of the inbound ticket format and operational defaults.

/// Keys of the flat field map carried by an inbound ticket
pub mod fields {
    pub const ID: &str = "id";
    pub const ACTION: &str = "action";
    pub const MESSAGE: &str = "message";
    pub const CORRECTION_TASK_ID: &str = "correctionTaskId";
    pub const PROPERTIES: &str = "properties";
}

/// Queue defaults
pub mod queues {
    pub const DEFAULT_TICKET_QUEUE: &str = "task_actions";
    pub const DEFAULT_RESULTS_QUEUE: &str = "task_action_results";
}

/// Operation names used in structured log events
pub mod operations {
    pub const DISPATCH: &str = "dispatch";
    pub const TRANSITION: &str = "transition";
    pub const REPORT: &str = "report";
    pub const REINDEX: &str = "reindex";
}
