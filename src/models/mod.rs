//! # Models
//!
//! Plain data types shared by the state machine, the correction ledger and the store adapters.

pub mod comment;
pub mod identity;
pub mod process;
pub mod task;

pub use comment::{CommentKind, CorrectionComment, NewComment};
pub use identity::Identity;
pub use process::Process;
pub use task::Task;
