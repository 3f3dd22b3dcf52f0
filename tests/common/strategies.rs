use proptest::prelude::*;

use docking_core::state_machine::TaskState;

/// Strategy for any task state
pub fn task_state_strategy() -> impl Strategy<Value = TaskState> {
    prop_oneof![
        Just(TaskState::Pending),
        Just(TaskState::Running),
        Just(TaskState::Succeeded),
        Just(TaskState::Failed),
        Just(TaskState::Cancelled),
    ]
}

/// Strategy for the task states of one run
pub fn run_task_states_strategy() -> impl Strategy<Value = Vec<TaskState>> {
    prop::collection::vec(task_state_strategy(), 0..40)
}

/// Strategy for terminal task states only
pub fn terminal_task_states_strategy() -> impl Strategy<Value = Vec<TaskState>> {
    prop::collection::vec(
        prop_oneof![
            Just(TaskState::Succeeded),
            Just(TaskState::Failed),
            Just(TaskState::Cancelled),
        ],
        1..40,
    )
}
