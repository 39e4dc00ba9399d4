mod common;

use common::*;
use proptest::prelude::*;
use serde_json::json;

use taskline_core::models::CommentKind;
use taskline_core::{ReportLevel, TaskStateMachine};

proptest! {
    /// Property: COMMENT never changes the status of any task, whatever the process looks like
    #[test]
    fn comment_never_changes_status(
        statuses in statuses_strategy(),
        ordinal in 1..=5i32,
        action in comment_action_strategy(),
        message in comment_message_strategy(),
    ) {
        let harness = DispatchHarness::new(statuses);
        let target = task_id(ordinal);

        let report = tokio_test::block_on(
            harness.send(json!({"id": target, "action": action, "message": message})),
        );

        prop_assert_eq!(report.level, ReportLevel::Success);
        for (i, expected) in statuses.iter().enumerate() {
            prop_assert_eq!(harness.status(task_id(i as i32 + 1)), *expected);
        }
        let comments = harness.store.comments_for_task(target);
        prop_assert_eq!(comments.len(), 1);
        prop_assert_eq!(comments[0].kind, CommentKind::Info);
    }

    /// Property: a ticket either succeeds with the tabled target status or leaves the task as it was
    #[test]
    fn status_changes_follow_transition_table(
        statuses in statuses_strategy(),
        ordinal in 1..=5i32,
        action in prop::sample::select(vec!["PROCESS", "ERROR_OPEN", "CLOSE"]),
    ) {
        let harness = DispatchHarness::new(statuses);
        let target = task_id(ordinal);
        let before = harness.store.task(target).unwrap();

        let report = tokio_test::block_on(
            harness.send(json!({"id": target, "action": action, "message": "checked"})),
        );

        let expected = TaskStateMachine::determine_target_status(&before, action.parse().unwrap());
        match expected {
            Ok(status) => {
                prop_assert!(report.is_success());
                prop_assert_eq!(harness.status(target), status);
            }
            Err(_) => {
                prop_assert_eq!(report.level, ReportLevel::Error);
                prop_assert_eq!(harness.status(target), before.status);
                prop_assert_eq!(harness.store.commit_count(), 0);
            }
        }
    }
}
