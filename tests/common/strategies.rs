//! Proptest strategies for ticket contents

use proptest::prelude::*;
use taskline_core::TaskStatus;

pub fn task_status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Locked),
        Just(TaskStatus::Open),
        Just(TaskStatus::InWork),
        Just(TaskStatus::Done),
    ]
}

pub fn statuses_strategy() -> impl Strategy<Value = [TaskStatus; 5]> {
    prop::array::uniform5(task_status_strategy())
}

/// Non-blank comment text
pub fn comment_message_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 .,!?-]{0,60}"
}

/// Action names in the spellings senders use
pub fn comment_action_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("COMMENT".to_string()),
        Just("comment".to_string()),
        Just(" Comment ".to_string()),
    ]
}
