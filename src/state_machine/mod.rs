// Task state machine
//
// Status model, action vocabulary, transition guards and mutations, and the per-process locks
// that serialize tickets touching the same process.

pub mod actions;
pub mod errors;
pub mod events;
pub mod guards;
pub mod locks;
pub mod states;
pub mod task_state_machine;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{ActionTicket, TaskAction};
pub use guards::{CorrectionTaskGuard, StateGuard};
pub use locks::{ProcessLockGuard, TransitionLocks};
pub use states::{TaskEditType, TaskStatus};
pub use task_state_machine::{TaskStateMachine, TransitionContext, TransitionOutcome};
