// State machine module for docking task life cycles
//
// Task status moves PENDING -> RUNNING -> {SUCCEEDED | FAILED} with an
// orthogonal CANCELLED edge from PENDING or RUNNING. Run and batch statuses
// are derived, see orchestration::status_aggregator.

pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::TaskEvent;
pub use states::{ConformerStatus, LigandStatus, RunStatus, StateParseError, TaskState};
pub use task_state_machine::{TaskStateMachine, CANCELLED_BY_USER};
