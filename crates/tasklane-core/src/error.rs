use thiserror::Error;

use crate::domain::TaskId;

/// Errors surfaced by queue and task management.
///
/// Task failure is not an error here: a failed attempt is part of the task
/// state machine and settles as `Finished` with `success == false`.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no tokio runtime available; build the queue inside a runtime or pass a handle")]
    NoRuntime,

    #[error("task {0} is already owned by a queue or has already started")]
    AlreadyQueued(TaskId),

    #[error("task {0} was started twice")]
    AlreadyStarted(TaskId),

    #[error("dependency cycle detected: {}", format_cycle(.0))]
    DependencyCycle(Vec<TaskId>),

    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_cycle(ids: &[TaskId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
