//! Group variant: children run on a private, unbounded sub-queue.
//!
//! The group blocks its own worker until every child settles, then finishes
//! with `success = true`. Failure of individual children is only visible
//! through `Task::all_children_succeeded`.

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::queue::TaskQueue;
use crate::task::{AttemptStart, Task};

pub(crate) struct GroupState {
    children: Vec<Task>,
    /// Present while the group is executing.
    queue: Mutex<Option<TaskQueue>>,
}

impl GroupState {
    pub(crate) fn new(children: Vec<Task>) -> Self {
        Self {
            children,
            queue: Mutex::new(None),
        }
    }

    pub(crate) fn children(&self) -> &[Task] {
        &self.children
    }

    pub(crate) fn all_succeeded(&self) -> bool {
        self.children.iter().all(Task::success)
    }

    pub(crate) fn queue(&self) -> Option<TaskQueue> {
        self.queue.lock().clone()
    }

    pub(crate) fn cancel_children(&self) {
        match self.queue() {
            Some(queue) => queue.cancel_all(),
            None => self.children.iter().for_each(Task::cancel),
        }
    }
}

pub(super) fn execute(task: &Task, group: &GroupState) {
    let queue = match TaskQueue::builder(format!("{}-group", task.label())).build() {
        Ok(queue) => queue,
        Err(err) => {
            error!(task = %task.label(), error = %err, "group could not create its sub-queue");
            group.children.iter().for_each(Task::cancel);
            task.finish(true);
            return;
        }
    };

    let next = task.inner.record.lock().begin_attempt(task.is_cancelled());
    match next {
        AttemptStart::Run { .. } => {}
        AttemptStart::Settled => {
            group.children.iter().for_each(Task::cancel);
            task.after_finish();
            return;
        }
        AttemptStart::Idle => return,
    }

    *group.queue.lock() = Some(queue.clone());
    // A cancel that raced the line above found no queue and cancelled the
    // children directly; queued cancelled children settle without running.
    debug!(task = %task.label(), children = group.children.len(), "group started");

    for child in &group.children {
        if let Err(err) = queue.add(child.clone()) {
            warn!(task = %task.label(), child = %child.label(), error = %err, "group child not queued");
        }
    }
    queue.blocking_wait_until_idle();

    group.queue.lock().take();
    task.inner.record.lock().in_body = false;
    debug!(
        task = %task.label(),
        all_succeeded = group.all_succeeded(),
        "group children settled"
    );
    task.finish(true);
}
