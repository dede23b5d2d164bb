//! Task lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a task.
///
/// State transitions:
/// - Pending -> Executing -> Finished
/// - Pending -> Finished (settled before it ever ran, e.g. cancelled)
/// - Executing -> Executing (a failed attempt that will be retried keeps the slot)
///
/// A single enum replaces an `executing`/`finished` flag pair, so a task can
/// never be reported as running and finished at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created or queued, waiting for dependencies or a worker.
    #[default]
    Pending,

    /// Admitted by a worker; attempts run (or are awaited) in this state.
    Executing,

    /// Terminal.
    Finished,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished)
    }

    /// Can a worker admit a task in this state?
    pub fn is_startable(self) -> bool {
        matches!(self, TaskState::Pending)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Executing => "executing",
            TaskState::Finished => "finished",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_finished_is_terminal() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Executing.is_terminal());
        assert!(TaskState::Finished.is_terminal());
    }

    #[test]
    fn only_pending_is_startable() {
        assert!(TaskState::Pending.is_startable());
        assert!(!TaskState::Executing.is_startable());
        assert!(!TaskState::Finished.is_startable());
    }

    #[test]
    fn state_serializes_as_snake_case() {
        let s = serde_json::to_string(&TaskState::Executing).unwrap();
        assert_eq!(s, "\"executing\"");
    }
}
