//! WorkerPool port - the execution service queues are built on.
//!
//! A queue never touches threads directly. It hands the pool one `WorkUnit`
//! per task and controls it through the calls below; how units are run
//! (threads, a tokio runtime, something else) is the implementation's concern.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::domain::TaskId;

/// Signal that a task has settled and its dependents may run.
///
/// Cloneable; any number of dependents can wait on the same task.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<bool>,
}

impl Completion {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the task settles.
    ///
    /// If the sending side goes away without settling, the wait ends too
    /// (nobody could ever settle it).
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|done| *done).await;
    }
}

/// One unit of schedulable work.
///
/// `run` drives the task to settlement; it resolves only once the task is
/// finished, so the pool holds a concurrency slot for the task's whole life,
/// not just for the first call into its body.
pub struct WorkUnit {
    pub id: TaskId,
    pub dependencies: Vec<Completion>,
    pub run: BoxFuture<'static, ()>,
}

impl WorkUnit {
    pub fn new(id: TaskId, dependencies: Vec<Completion>, run: BoxFuture<'static, ()>) -> Self {
        Self {
            id,
            dependencies,
            run,
        }
    }
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}

/// Execution service port.
///
/// Contract:
/// - a unit becomes eligible once all its dependencies are complete
/// - at most `concurrency_limit` units run at once (`None` = unbounded)
/// - while suspended, no new unit is admitted; running units continue
/// - `cancel_all` releases units still waiting (for dependencies or
///   admission) so they run immediately and can settle as cancelled
#[async_trait]
pub trait WorkerPool: Send + Sync {
    fn submit(&self, unit: WorkUnit);

    fn cancel_all(&self);

    fn set_concurrency_limit(&self, limit: Option<usize>);

    fn concurrency_limit(&self) -> Option<usize>;

    fn set_suspended(&self, suspended: bool);

    fn is_suspended(&self) -> bool;

    /// Units submitted and not yet completed.
    fn in_flight(&self) -> usize;

    /// Resolve once no unit is in flight.
    async fn drain(&self);
}
