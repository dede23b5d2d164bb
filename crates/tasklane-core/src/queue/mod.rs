//! TaskQueue - named, bounded-concurrency execution context.
//!
//! Design:
//! - A queue owns the tasks it was given until they settle, plus the
//!   dependency graph between them.
//! - Execution is delegated to a `WorkerPool`; the queue never touches
//!   threads itself.
//! - Submission is all-or-nothing: every task of one call is claimed and the
//!   resulting graph is checked for cycles before anything reaches the pool.
//! - Submission and `cancel_all` serialize on the task list, so a task is
//!   either seen by a cancel or submitted after it.

mod dependency;
mod dispatch;
pub mod sugar;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{QueueConfig, ServiceLevel};
use crate::domain::{QueueId, QueueSnapshot, TaskSnapshot};
use crate::error::QueueError;
use crate::impls::TokioPool;
use crate::ports::WorkerPool;
use crate::task::Task;

pub use self::dependency::DependencyGraph;

pub(crate) struct QueueShared {
    id: QueueId,
    name: String,
    service_level: ServiceLevel,
    pool: Arc<dyn WorkerPool>,
    tasks: Mutex<Vec<Task>>,
    graph: Mutex<DependencyGraph>,
    /// Number of owned tasks; `wait_until_idle` watches it reach zero.
    count: watch::Sender<usize>,
}

impl QueueShared {
    /// Forget a settled task.
    fn settle(&self, task: &Task) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| t != task);
        self.graph.lock().remove_task(task.id());
        self.count.send_replace(tasks.len());
        debug!(queue = %self.name, task = %task.label(), remaining = tasks.len(), "task settled");
    }
}

/// Handle to a queue. Clones share the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<QueueShared>,
}

pub struct QueueBuilder {
    config: QueueConfig,
    pool: Option<Arc<dyn WorkerPool>>,
    handle: Option<Handle>,
}

impl QueueBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: QueueConfig::named(name),
            pool: None,
            handle: None,
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = Some(max);
        self
    }

    pub fn service_level(mut self, level: ServiceLevel) -> Self {
        self.config.service_level = level;
        self
    }

    /// Run on a custom pool instead of a `TokioPool`.
    pub fn pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Runtime for the default pool; defaults to the current one.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn build(self) -> Result<TaskQueue, QueueError> {
        self.config.validate()?;

        let pool: Arc<dyn WorkerPool> = match self.pool {
            Some(pool) => {
                pool.set_concurrency_limit(self.config.max_concurrent);
                pool
            }
            None => {
                let handle = match self.handle {
                    Some(handle) => handle,
                    None => Handle::try_current().map_err(|_| QueueError::NoRuntime)?,
                };
                Arc::new(TokioPool::new(handle, self.config.max_concurrent))
            }
        };

        let (count, _) = watch::channel(0);
        let queue = TaskQueue {
            shared: Arc::new(QueueShared {
                id: QueueId::generate(),
                name: self.config.name,
                service_level: self.config.service_level,
                pool,
                tasks: Mutex::new(Vec::new()),
                graph: Mutex::new(DependencyGraph::new()),
                count,
            }),
        };
        debug!(
            queue = %queue.name(),
            id = %queue.id(),
            max_concurrent = ?queue.max_concurrent(),
            service_level = ?queue.service_level(),
            "queue created"
        );
        Ok(queue)
    }
}

impl TaskQueue {
    pub fn builder(name: impl Into<String>) -> QueueBuilder {
        QueueBuilder::new(name)
    }

    /// Unbounded queue on the current tokio runtime.
    pub fn new(name: impl Into<String>) -> Result<Self, QueueError> {
        QueueBuilder::new(name).build()
    }

    pub fn id(&self) -> QueueId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn service_level(&self) -> ServiceLevel {
        self.shared.service_level
    }

    pub fn max_concurrent(&self) -> Option<usize> {
        self.shared.pool.concurrency_limit()
    }

    /// `None` lifts the limit. Takes effect for tasks not yet admitted.
    pub fn set_max_concurrent(&self, max: Option<usize>) {
        self.shared.pool.set_concurrency_limit(max);
    }

    // ---- submission ----

    pub fn add(&self, task: Task) -> Result<(), QueueError> {
        self.submit(vec![(task, None)])
    }

    /// Queue a closure as a default task. Returns the created task.
    pub fn add_fn(&self, f: impl Fn() + Send + Sync + 'static) -> Result<Task, QueueError> {
        let task = Task::new(move |_: &Task| f());
        self.add(task.clone())?;
        Ok(task)
    }

    /// Queue `tasks` so that each starts only after the previous one settled,
    /// whatever its outcome.
    pub fn add_chained(&self, tasks: impl IntoIterator<Item = Task>) -> Result<(), QueueError> {
        self.submit(chain(tasks.into_iter().collect(), None))
    }

    /// Like `add_chained`, then run `on_complete` after the last task.
    ///
    /// With no tasks the handler still runs.
    pub fn add_chained_with(
        &self,
        tasks: impl IntoIterator<Item = Task>,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> Result<(), QueueError> {
        let handler = Task::handler(on_complete);
        self.submit(chain(tasks.into_iter().collect(), Some(handler)))
    }

    /// Run `f` once every task queued right now has settled.
    pub fn add_completion_handler(&self, f: impl FnOnce() + Send + 'static) -> Result<(), QueueError> {
        let handler = Task::handler(f);
        for task in self.tasks() {
            handler.add_dependency(&task);
        }
        self.add(handler)
    }

    /// Validate and hand a batch to the pool. Each entry may carry one extra
    /// dependency that is attached only if the whole batch is accepted.
    fn submit(&self, batch: Vec<(Task, Option<Task>)>) -> Result<(), QueueError> {
        for (i, (task, _)) in batch.iter().enumerate() {
            if let Err(err) = task.claim_for_queue() {
                batch[..i].iter().for_each(|(t, _)| t.release_claim());
                return Err(err);
            }
        }

        let mut tasks = self.shared.tasks.lock();
        let mut graph = self.shared.graph.lock();

        let mut candidate = graph.clone();
        for (task, extra) in &batch {
            for dep in task.dependencies().iter().chain(extra) {
                candidate.add_dependency(task.id(), dep.id());
            }
        }
        if let Some(cycle) = candidate.detect_cycle() {
            batch.iter().for_each(|(t, _)| t.release_claim());
            return Err(QueueError::DependencyCycle(cycle));
        }
        *graph = candidate;
        drop(graph);

        for (task, extra) in batch {
            if let Some(dep) = &extra {
                task.add_dependency(dep);
            }
            debug!(queue = %self.name(), task = %task.label(), "task queued");
            tasks.push(task.clone());
            self.shared.count.send_replace(tasks.len());
            self.shared
                .pool
                .submit(dispatch::work_unit(Arc::clone(&self.shared), task));
        }
        Ok(())
    }

    // ---- control ----

    /// Cancel every owned task and release those still waiting, so they
    /// settle without running. Bodies already running must observe
    /// `Task::is_cancelled` themselves.
    pub fn cancel_all(&self) {
        let newly_cancelled: Vec<Task> = {
            let tasks = self.shared.tasks.lock();
            let newly: Vec<Task> = tasks.iter().filter(|t| t.request_cancel()).cloned().collect();
            self.shared.pool.cancel_all();
            newly
        };
        info!(queue = %self.name(), cancelled = newly_cancelled.len(), "queue cancelled");
        for task in &newly_cancelled {
            task.run_cancel_hooks();
        }
    }

    /// Stop admitting tasks and pause the ones already owned.
    pub fn pause(&self) {
        self.shared.pool.set_suspended(true);
        info!(queue = %self.name(), "queue paused");
        for task in self.tasks() {
            task.pause();
        }
    }

    pub fn resume(&self) {
        self.shared.pool.set_suspended(false);
        info!(queue = %self.name(), "queue resumed");
        for task in self.tasks() {
            task.resume();
        }
    }

    /// False while paused.
    pub fn is_executing(&self) -> bool {
        !self.shared.pool.is_suspended()
    }

    /// Tasks owned and not yet settled.
    pub fn operation_count(&self) -> usize {
        self.shared.tasks.lock().len()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.shared.tasks.lock().clone()
    }

    /// Resolve once the queue owns no task.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.shared.count.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Block the calling thread until the queue owns no task.
    ///
    /// Must not be called from a task of this queue (it would wait for
    /// itself) nor from an async worker thread; use `wait_until_idle` there.
    pub fn blocking_wait_until_idle(&self) {
        futures::executor::block_on(self.wait_until_idle());
    }

    /// Progress and named dependencies of every named task owned right now.
    pub fn snapshot(&self) -> QueueSnapshot {
        let entries = self
            .tasks()
            .iter()
            .filter_map(|task| {
                let name = task.name()?;
                let dependencies = task
                    .dependencies()
                    .iter()
                    .filter_map(|dep| dep.name().map(str::to_owned))
                    .collect();
                Some(TaskSnapshot::new(name, task.progress(), dependencies))
            })
            .collect();
        QueueSnapshot::new(entries)
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("service_level", &self.shared.service_level)
            .field("operation_count", &self.operation_count())
            .finish_non_exhaustive()
    }
}

/// Batch for `tasks` linked one after another, plus an optional trailing
/// handler that waits for the last link.
fn chain(tasks: Vec<Task>, handler: Option<Task>) -> Vec<(Task, Option<Task>)> {
    let mut batch = Vec::with_capacity(tasks.len() + 1);
    let mut previous: Option<Task> = None;
    for task in tasks {
        batch.push((task.clone(), previous.replace(task)));
    }
    if let Some(handler) = handler {
        batch.push((handler, previous));
    }
    batch
}
