use std::sync::Arc;

use crate::config::TaskOptions;
use crate::task::{CompletionHandler, GroupState, RetryPolicy, SyncGate, Task, TaskKind, Work};

/// Builder for every task variant.
///
/// ```ignore
/// let task = Task::builder()
///     .name("upload")
///     .maximum_retries(5)
///     .work(|task: &Task| task.set_success(upload().is_ok()))
///     .on_complete(|task: &Task| println!("upload done: {}", task.success()))
///     .build();
/// ```
#[derive(Default)]
pub struct TaskBuilder {
    options: TaskOptions,
    work: Option<Arc<dyn Work>>,
    on_complete: Option<CompletionHandler>,
    dependencies: Vec<Task>,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub fn maximum_retries(mut self, maximum_retries: u32) -> Self {
        self.options.maximum_retries = maximum_retries;
        self
    }

    pub fn manual_retry(mut self, manual_retry: bool) -> Self {
        self.options.manual_retry = manual_retry;
        self
    }

    pub fn manual_finish(mut self, manual_finish: bool) -> Self {
        self.options.manual_finish = manual_finish;
        self
    }

    pub fn work(mut self, work: impl Work) -> Self {
        self.work = Some(Arc::new(work));
        self
    }

    /// Runs after the task reaches Finished, before dependents may start.
    pub fn on_complete(mut self, handler: impl FnOnce(&Task) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(handler));
        self
    }

    pub fn depends_on(mut self, dependency: &Task) -> Self {
        if !self.dependencies.contains(dependency) {
            self.dependencies.push(dependency.clone());
        }
        self
    }

    /// Concurrent task: the worker is free once the body returns.
    pub fn build(self) -> Task {
        self.assemble(TaskKind::Concurrent)
    }

    /// The worker stays blocked until the task settles, even if the body
    /// hands its work to another thread and calls `finish` from there.
    pub fn synchronous(self) -> Task {
        self.assemble(TaskKind::Synchronous(SyncGate::new()))
    }

    /// Run `children` on a private sub-queue.
    ///
    /// A group always settles with `success = true`; read
    /// `all_children_succeeded` for the aggregate. Groups have no body and
    /// cannot be retried manually.
    pub fn group(mut self, children: impl IntoIterator<Item = Task>) -> Task {
        self.options.manual_retry = false;
        self.options.manual_finish = false;
        self.work = None;
        let children = children.into_iter().collect();
        self.assemble(TaskKind::Group(GroupState::new(children)))
    }

    fn assemble(self, kind: TaskKind) -> Task {
        let policy = RetryPolicy::from(&self.options);
        Task::from_parts(
            self.options.name,
            policy,
            self.work,
            kind,
            self.on_complete,
            self.dependencies,
        )
    }
}
