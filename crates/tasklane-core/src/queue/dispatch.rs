//! Turn a queued task into a pool `WorkUnit`.
//!
//! The unit's future:
//! 1. starts the task on tokio's blocking pool (bodies may block)
//! 2. waits until the task settles, which may happen later, from another
//!    thread, for manual-finish tasks
//! 3. runs the completion handler, again on the blocking pool
//! 4. removes the task from its queue and releases dependents
//!
//! The future needs a tokio runtime context for `spawn_blocking`.

use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::ports::WorkUnit;
use crate::queue::QueueShared;
use crate::task::Task;

pub(crate) fn work_unit(queue: Arc<QueueShared>, task: Task) -> WorkUnit {
    let dependencies = task.dependencies().iter().map(Task::completion).collect();
    let id = task.id();

    let run = async move {
        debug!(queue = %queue.name, task = %task.label(), "task admitted");

        let runner = task.clone();
        match tokio::task::spawn_blocking(move || runner.start()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(queue = %queue.name, task = %task.label(), error = %err, "task not started");
            }
            Err(err) => {
                error!(queue = %queue.name, task = %task.label(), error = %err, "task driver failed");
                task.force_finish();
            }
        }

        task.wait_until_finished().await;

        let runner = task.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || runner.run_completion()).await {
            error!(queue = %queue.name, task = %task.label(), error = %err, "completion handler failed");
        }

        queue.settle(&task);
        task.mark_done();
    }
    .boxed();

    WorkUnit::new(id, dependencies, run)
}
