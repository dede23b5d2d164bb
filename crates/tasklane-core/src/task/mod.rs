//! Task - retryable, cancellable unit of work.
//!
//! Design:
//! - `Task` is a handle (`Arc` inside); clones observe and drive the same task.
//! - All mutable state lives in one `TaskRecord` behind a mutex; the
//!   completion decision is the pure `RetryPolicy::decide`.
//! - Variants are a closed enum (`TaskKind`) dispatched in `execute`:
//!   concurrent, synchronous (worker blocks until settlement) and group
//!   (children on a private sub-queue).
//! - Cancellation is cooperative. The body observes `is_cancelled`; the
//!   engine only settles a task on its own when no body is in flight.
//! - A panic in a body is caught and counts as a failed attempt.
//!
//! Attempt lifecycle:
//! - `begin_attempt` is the only place an attempt starts. It requires the
//!   Executing state and an owed attempt (`attempt_pending`), so two
//!   threads can never run the same attempt.
//! - `in_body` is set while a body runs. `finish` called from inside the
//!   body only records the outcome; the thread that ran the body picks up
//!   the retry afterwards.
//! - `driving` marks the automatic loop. A `finish` arriving from another
//!   thread re-drives the task only when no loop and no body own it.
//! - Manual-retry tasks never loop. Each `retry` runs at most one attempt.
//!
//! Synchronous tasks:
//! - The worker that started the task blocks on a `SyncGate` until the
//!   task settles, even when the body hands `finish` off elsewhere.
//! - The gate is a latch. Once released it lets every current and later
//!   waiter through, and `execute` on a task that is not executing never
//!   waits on it.
//!
//! Completion ordering:
//! - Finished is published first, then the synchronous gate opens, then
//!   the completion handler runs once, then `completion()` resolves.
//! - For queued tasks the dispatcher runs the handler and marks the task
//!   done, so dependants are admitted only after the handler returned.

mod builder;
mod group;
pub mod record;
pub mod retry;
mod work;

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::domain::{TaskId, TaskState};
use crate::error::QueueError;
use crate::ports::Completion;
use crate::queue::TaskQueue;
use crate::sync::Semaphore;

pub use self::builder::TaskBuilder;
pub use self::record::{AttemptStart, TaskRecord};
pub use self::retry::{RetryPolicy, Settlement};
pub use self::work::Work;

pub(crate) use self::group::GroupState;

/// Runs once, after the task reaches Finished.
pub(crate) type CompletionHandler = Box<dyn FnOnce(&Task) + Send + 'static>;

/// Blocks a worker until the task settles. Released at most once.
pub(crate) struct SyncGate {
    semaphore: Semaphore,
    released: AtomicBool,
}

impl SyncGate {
    fn new() -> Self {
        Self {
            semaphore: Semaphore::new(),
            released: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.semaphore.signal();
        }
    }

    /// Once released, every current and later waiter passes: the permit is
    /// handed back after each wait.
    fn wait(&self) {
        self.semaphore.wait();
        self.semaphore.signal();
    }
}

/// Execution variant of a task.
pub(crate) enum TaskKind {
    Concurrent,
    Synchronous(SyncGate),
    Group(GroupState),
}

impl TaskKind {
    fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Concurrent => "concurrent",
            TaskKind::Synchronous(_) => "synchronous",
            TaskKind::Group(_) => "group",
        }
    }
}

pub(crate) struct TaskInner {
    id: TaskId,
    name: Option<String>,
    policy: RetryPolicy,
    work: Option<Arc<dyn Work>>,
    kind: TaskKind,
    record: Mutex<TaskRecord>,
    cancelled: AtomicBool,
    progress: AtomicU8,
    dependencies: Mutex<Vec<Task>>,
    on_complete: Mutex<Option<CompletionHandler>>,
    /// Mirrors `record.state` for async observers.
    state_tx: watch::Sender<TaskState>,
    /// Set once the completion handler ran; dependents wait on this.
    done_tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    pub fn builder() -> TaskBuilder {
        TaskBuilder::new()
    }

    /// Concurrent task with default options.
    pub fn new(work: impl Work) -> Self {
        TaskBuilder::new().work(work).build()
    }

    pub fn named(name: impl Into<String>, work: impl Work) -> Self {
        TaskBuilder::new().name(name).work(work).build()
    }

    /// Task without a body; it finishes successfully as soon as it starts.
    pub fn empty() -> Self {
        TaskBuilder::new().build()
    }

    /// Body-less task that runs `f` once it settles.
    pub(crate) fn handler(f: impl FnOnce() + Send + 'static) -> Self {
        TaskBuilder::new().on_complete(move |_| f()).build()
    }

    pub(crate) fn from_parts(
        name: Option<String>,
        policy: RetryPolicy,
        work: Option<Arc<dyn Work>>,
        kind: TaskKind,
        on_complete: Option<CompletionHandler>,
        dependencies: Vec<Task>,
    ) -> Self {
        let (state_tx, _) = watch::channel(TaskState::Pending);
        let (done_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::generate(),
                name,
                policy,
                work,
                kind,
                record: Mutex::new(TaskRecord::new()),
                cancelled: AtomicBool::new(false),
                progress: AtomicU8::new(0),
                dependencies: Mutex::new(dependencies),
                on_complete: Mutex::new(on_complete),
                state_tx,
                done_tx,
            }),
        }
    }

    // ---- accessors ----

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Name if set, otherwise the id.
    pub fn label(&self) -> String {
        match &self.inner.name {
            Some(name) => name.clone(),
            None => self.inner.id.to_string(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.inner.record.lock().state
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    pub fn is_executing(&self) -> bool {
        self.state() == TaskState::Executing
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    pub fn success(&self) -> bool {
        self.inner.record.lock().success
    }

    /// Report the outcome of the running attempt.
    pub fn set_success(&self, success: bool) {
        self.inner.record.lock().success = success;
    }

    pub fn current_attempt(&self) -> u32 {
        self.inner.record.lock().current_attempt
    }

    pub fn maximum_retries(&self) -> u32 {
        self.inner.policy.maximum_retries
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    pub fn progress(&self) -> u8 {
        self.inner.progress.load(Ordering::Relaxed)
    }

    /// Clamped to `0..=100`.
    pub fn set_progress(&self, progress: i64) {
        let clamped = progress.clamp(0, 100) as u8;
        self.inner.progress.store(clamped, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.record.lock().started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.inner.record.lock().finished_at
    }

    pub fn dependencies(&self) -> Vec<Task> {
        self.inner.dependencies.lock().clone()
    }

    /// `self` will not run before `dependency` settles.
    ///
    /// Only honoured if added before the task is queued.
    pub fn add_dependency(&self, dependency: &Task) {
        if dependency == self {
            return;
        }
        let mut deps = self.inner.dependencies.lock();
        if !deps.contains(dependency) {
            deps.push(dependency.clone());
        }
    }

    /// For groups: `Some(true)` if no child reported failure.
    pub fn all_children_succeeded(&self) -> Option<bool> {
        match &self.inner.kind {
            TaskKind::Group(group) => Some(group.all_succeeded()),
            _ => None,
        }
    }

    /// Children of a group; empty for other variants.
    pub fn children(&self) -> &[Task] {
        match &self.inner.kind {
            TaskKind::Group(group) => group.children(),
            _ => &[],
        }
    }

    pub fn is_synchronous(&self) -> bool {
        matches!(self.inner.kind, TaskKind::Synchronous(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self.inner.kind, TaskKind::Group(_))
    }

    // ---- lifecycle ----

    /// Pending -> Executing, then run the task on the calling thread.
    ///
    /// Starting a finished task does nothing. Starting a task that is
    /// already executing is a caller error.
    pub fn start(&self) -> Result<(), QueueError> {
        {
            let mut record = self.inner.record.lock();
            match record.state {
                TaskState::Finished => return Ok(()),
                TaskState::Executing => {
                    warn!(task = %self.label(), "start called on an executing task");
                    return Err(QueueError::AlreadyStarted(self.inner.id));
                }
                TaskState::Pending => {
                    record.mark_started();
                }
            }
        }
        self.inner.state_tx.send_replace(TaskState::Executing);
        debug!(task = %self.label(), kind = self.inner.kind.as_str(), "task started");

        self.execute();
        Ok(())
    }

    /// Run the task body according to its variant. Called by `start`.
    ///
    /// Only an executing task runs anything: on a pending or finished task
    /// this returns at once. A synchronous task blocks the caller only while
    /// the task is still executing after the owed attempt ran.
    pub fn execute(&self) {
        if !self.is_executing() {
            return;
        }
        match &self.inner.kind {
            TaskKind::Concurrent => self.drive(),
            TaskKind::Synchronous(gate) => {
                self.drive();
                if self.is_executing() {
                    gate.wait();
                }
            }
            TaskKind::Group(group) => group::execute(self, group),
        }
    }

    fn drive(&self) {
        match &self.inner.work {
            None => self.finish(true),
            Some(_) if self.inner.policy.manual_retry => self.retry(),
            Some(work) => self.run_automatic(work),
        }
    }

    /// Automatic attempt loop; owns the task while `record.driving` is set.
    fn run_automatic(&self, work: &Arc<dyn Work>) {
        {
            let mut record = self.inner.record.lock();
            if record.driving {
                return;
            }
            record.driving = true;
        }

        loop {
            let next = {
                let mut record = self.inner.record.lock();
                let next = record.begin_attempt(self.is_cancelled());
                if !matches!(next, AttemptStart::Run { .. }) {
                    record.driving = false;
                }
                next
            };

            match next {
                AttemptStart::Run { attempt } => {
                    if self.invoke(work, attempt) {
                        let success = self.success();
                        self.finish(success);
                    }
                }
                AttemptStart::Settled => {
                    self.after_finish();
                    return;
                }
                AttemptStart::Idle => return,
            }
        }
    }

    /// Run one attempt. Returns whether the engine should settle it now.
    fn invoke(&self, work: &Arc<dyn Work>, attempt: u32) -> bool {
        debug!(task = %self.label(), attempt, "attempt started");
        let outcome = catch_unwind(AssertUnwindSafe(|| work.run(self)));

        let mut record = self.inner.record.lock();
        record.in_body = false;
        let panicked = outcome.is_err();
        if let Err(payload) = &outcome {
            record.success = false;
            error!(
                task = %self.label(),
                attempt,
                panic = panic_message(&**payload),
                "task body panicked"
            );
        }

        // The body may already have settled or rescheduled via `finish`.
        let open = record.state == TaskState::Executing && !record.attempt_pending;
        open && (panicked || !self.inner.policy.manual_finish)
    }

    /// Report the outcome of the current attempt.
    ///
    /// Settles the task if the attempt succeeded, the task was cancelled or
    /// the retry ceiling is reached; otherwise schedules another attempt.
    /// Automatic tasks run that attempt right away, on this thread if no
    /// loop is currently driving the task.
    pub fn finish(&self, success: bool) {
        let (settled, redrive) = {
            let mut record = self.inner.record.lock();
            if record.state.is_terminal() {
                return;
            }
            record.success = success;
            match self
                .inner
                .policy
                .decide(record.current_attempt, success, self.is_cancelled())
            {
                Settlement::Finish => {
                    record.mark_finished();
                    (true, false)
                }
                Settlement::Retry { next_attempt } => {
                    record.schedule_retry(next_attempt);
                    debug!(task = %self.label(), next_attempt, "attempt failed, retry scheduled");
                    let redrive = !self.inner.policy.manual_retry
                        && record.state == TaskState::Executing
                        && !record.driving
                        && !record.in_body;
                    (false, redrive)
                }
            }
        };

        if settled {
            self.after_finish();
        } else if redrive && let Some(work) = &self.inner.work {
            self.run_automatic(work);
        }
    }

    /// Run one more attempt of a manual-retry task.
    ///
    /// No-op unless the task uses manual retry, is executing, and is owed
    /// an attempt (initially, or after a failed one).
    pub fn retry(&self) {
        if !self.inner.policy.manual_retry {
            warn!(task = %self.label(), "retry ignored: task does not use manual retry");
            return;
        }
        let Some(work) = &self.inner.work else {
            return;
        };

        let next = self
            .inner
            .record
            .lock()
            .begin_attempt(self.is_cancelled());
        match next {
            AttemptStart::Run { attempt } => {
                if self.invoke(work, attempt) {
                    let success = self.success();
                    self.finish(success);
                }
            }
            AttemptStart::Settled => self.after_finish(),
            AttemptStart::Idle => {}
        }
    }

    /// Request cancellation.
    ///
    /// Sets the flag and calls the work's `on_cancel` hook. A synchronous
    /// task releases its worker; a group cancels its children. A task
    /// parked between attempts settles immediately.
    pub fn cancel(&self) {
        if self.request_cancel() {
            self.run_cancel_hooks();
        }
    }

    /// Set the flag only. True on the first call.
    pub(crate) fn request_cancel(&self) -> bool {
        !self.inner.cancelled.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn run_cancel_hooks(&self) {
        debug!(task = %self.label(), "task cancelled");
        if let Some(work) = &self.inner.work {
            work.on_cancel(self);
        }
        match &self.inner.kind {
            TaskKind::Synchronous(gate) => gate.release(),
            TaskKind::Group(group) => group.cancel_children(),
            TaskKind::Concurrent => {}
        }

        let settle = {
            let mut record = self.inner.record.lock();
            if record.is_awaiting_attempt() {
                record.mark_finished();
                true
            } else {
                false
            }
        };
        if settle {
            self.after_finish();
        }
    }

    pub fn pause(&self) {
        if let Some(work) = &self.inner.work {
            work.on_pause(self);
        }
        if let TaskKind::Group(group) = &self.inner.kind
            && let Some(queue) = group.queue()
        {
            queue.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(work) = &self.inner.work {
            work.on_resume(self);
        }
        if let TaskKind::Group(group) = &self.inner.kind
            && let Some(queue) = group.queue()
        {
            queue.resume();
        }
    }

    pub fn add_to_queue(&self, queue: &TaskQueue) -> Result<(), QueueError> {
        queue.add(self.clone())
    }

    /// Resolve once the task reaches Finished.
    pub async fn wait_until_finished(&self) {
        let mut rx = self.inner.state_tx.subscribe();
        let _ = rx.wait_for(|state| state.is_terminal()).await;
    }

    // ---- settlement plumbing ----

    /// Publish Finished and release anything blocked on it.
    fn after_finish(&self) {
        let (success, attempts, queued) = {
            let record = self.inner.record.lock();
            (record.success, record.current_attempt, record.queued)
        };
        self.inner.state_tx.send_replace(TaskState::Finished);
        debug!(task = %self.label(), success, attempts, cancelled = self.is_cancelled(), "task finished");

        if let TaskKind::Synchronous(gate) = &self.inner.kind {
            gate.release();
        }
        // Queued tasks have their completion run by the dispatcher.
        if !queued {
            self.run_completion();
            self.mark_done();
        }
    }

    /// Settle regardless of policy. Used when the driver itself failed.
    pub(crate) fn force_finish(&self) {
        let settled = {
            let mut record = self.inner.record.lock();
            record.in_body = false;
            record.driving = false;
            if record.state.is_terminal() {
                false
            } else {
                record.success = false;
                record.mark_finished();
                true
            }
        };
        if settled {
            self.after_finish();
        }
    }

    /// Run the completion handler, once.
    pub(crate) fn run_completion(&self) {
        let handler = self.inner.on_complete.lock().take();
        if let Some(handler) = handler
            && let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(self)))
        {
            error!(
                task = %self.label(),
                panic = panic_message(&*payload),
                "completion handler panicked"
            );
        }
    }

    pub(crate) fn mark_done(&self) {
        self.inner.done_tx.send_replace(true);
    }

    /// Signal that resolves once the task settled and its handler ran.
    pub fn completion(&self) -> Completion {
        Completion::new(self.inner.done_tx.subscribe())
    }

    /// Take ownership for a queue. Only pending, unowned tasks can be queued.
    pub(crate) fn claim_for_queue(&self) -> Result<(), QueueError> {
        let mut record = self.inner.record.lock();
        if record.queued || record.state != TaskState::Pending {
            return Err(QueueError::AlreadyQueued(self.inner.id));
        }
        record.queued = true;
        Ok(())
    }

    pub(crate) fn release_claim(&self) {
        self.inner.record.lock().queued = false;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Task {}

impl std::hash::Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.inner.record.lock();
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind.as_str())
            .field("state", &record.state)
            .field("success", &record.success)
            .field("current_attempt", &record.current_attempt)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::Duration;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[test]
    fn always_failing_body_runs_maximum_retries_times() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::builder()
            .maximum_retries(4)
            .work(move |task: &Task| {
                seen.fetch_add(1, Ordering::SeqCst);
                task.set_success(false);
            })
            .build();

        task.start().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert_eq!(task.current_attempt(), 4);
        assert!(task.is_finished());
        assert!(!task.success());
    }

    #[test]
    fn first_try_success_runs_once() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::new(move |_: &Task| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        task.start().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(task.current_attempt(), 1);
        assert!(task.success());
        assert!(task.started_at().is_some());
        assert!(task.finished_at() >= task.started_at());
    }

    #[test]
    fn success_is_reset_for_each_attempt() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::new(move |task: &Task| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                task.set_success(false);
            }
        });

        task.start().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(task.current_attempt(), 2);
        assert!(task.success());
    }

    #[test]
    fn empty_task_finishes_successfully() {
        let task = Task::empty();
        task.start().unwrap();
        assert!(task.is_finished());
        assert!(task.success());
    }

    #[test]
    fn second_start_is_rejected_and_restart_after_finish_is_noop() {
        let task = Task::builder().manual_finish(true).work(|_: &Task| {}).build();
        task.start().unwrap();
        assert!(task.is_executing());
        assert!(matches!(task.start(), Err(QueueError::AlreadyStarted(_))));

        task.finish(true);
        assert!(task.is_finished());
        assert!(task.start().is_ok());
    }

    #[test]
    fn cancelled_before_start_never_runs_the_body() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::new(move |_: &Task| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        task.cancel();
        task.start().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(task.is_finished());
        assert!(task.is_cancelled());
    }

    #[test]
    fn cancellation_preempts_remaining_retries() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::builder()
            .maximum_retries(5)
            .work(move |task: &Task| {
                seen.fetch_add(1, Ordering::SeqCst);
                task.cancel();
                task.set_success(false);
            })
            .build();

        task.start().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(task.current_attempt(), 1);
        assert!(task.is_finished());
        assert!(!task.success());
    }

    #[test]
    fn panic_counts_as_failed_attempt() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::builder()
            .maximum_retries(2)
            .work(move |_: &Task| {
                seen.fetch_add(1, Ordering::SeqCst);
                panic!("boom");
            })
            .build();

        task.start().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(task.is_finished());
        assert!(!task.success());
    }

    #[test]
    fn manual_retry_runs_one_attempt_per_call() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::builder()
            .manual_retry(true)
            .maximum_retries(3)
            .work(move |task: &Task| {
                seen.fetch_add(1, Ordering::SeqCst);
                task.set_success(false);
            })
            .build();

        task.start().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(task.is_executing());
        assert_eq!(task.current_attempt(), 2);

        task.retry();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        task.retry();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(task.is_finished());
        assert_eq!(task.current_attempt(), 3);

        task.retry();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_on_automatic_task_is_noop() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::new(move |_: &Task| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        task.start().unwrap();
        task.retry();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelling_a_parked_manual_retry_task_settles_it() {
        let task = Task::builder()
            .manual_retry(true)
            .work(|task: &Task| task.set_success(false))
            .build();
        task.start().unwrap();
        assert!(task.is_executing());

        task.cancel();
        assert!(task.is_finished());
    }

    #[test]
    fn manual_finish_from_another_thread_redrives_retries() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::builder()
            .manual_finish(true)
            .maximum_retries(3)
            .work(move |task: &Task| {
                let attempt = seen.fetch_add(1, Ordering::SeqCst) + 1;
                let task = task.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    task.finish(attempt == 2);
                });
            })
            .build();

        task.start().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !task.is_finished() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(task.is_finished());
        assert!(task.success());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(task.current_attempt(), 2);
    }

    #[test]
    fn finish_inside_body_does_not_duplicate_the_attempt() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::builder()
            .manual_finish(true)
            .maximum_retries(3)
            .work(move |task: &Task| {
                seen.fetch_add(1, Ordering::SeqCst);
                task.finish(false);
            })
            .build();

        task.start().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(task.current_attempt(), 3);
        assert!(task.is_finished());
    }

    #[test]
    fn synchronous_task_blocks_until_async_completion() {
        let task = Task::builder()
            .manual_finish(true)
            .work(|task: &Task| {
                let task = task.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(20));
                    task.finish(true);
                });
            })
            .synchronous();

        let runner = task.clone();
        let handle = thread::spawn(move || runner.start());

        // start returns only after finish(true) released the worker
        handle.join().unwrap().unwrap();
        assert!(task.is_finished());
        assert!(task.is_synchronous());
    }

    #[test]
    fn synchronous_task_is_released_by_cancel() {
        let task = Task::builder()
            .manual_finish(true)
            .work(|_: &Task| {})
            .synchronous();

        let runner = task.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = runner.start();
            let _ = tx.send(());
        });

        thread::sleep(Duration::from_millis(20));
        task.cancel();
        rx.recv_timeout(Duration::from_secs(5))
            .expect("cancel must release the blocked worker");
    }

    #[test]
    fn synchronous_task_is_released_when_body_panics() {
        let task = Task::builder()
            .maximum_retries(1)
            .work(|_: &Task| panic!("boom"))
            .synchronous();

        let runner = task.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = runner.start();
            let _ = tx.send(());
        });

        rx.recv_timeout(Duration::from_secs(5))
            .expect("a panicking body must not deadlock its worker");
        assert!(task.is_finished());
        assert!(!task.success());
    }

    #[test]
    fn execute_on_a_settled_synchronous_task_returns() {
        let task = Task::builder().work(|_: &Task| {}).synchronous();
        task.start().unwrap();
        assert!(task.is_finished());

        let runner = task.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            runner.execute();
            runner.execute();
            let _ = tx.send(());
        });

        rx.recv_timeout(Duration::from_secs(5))
            .expect("execute on a finished task must not block");
    }

    #[test]
    fn execute_on_a_pending_synchronous_task_does_nothing() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::builder()
            .work(move |_: &Task| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .synchronous();

        let runner = task.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            runner.execute();
            let _ = tx.send(());
        });

        rx.recv_timeout(Duration::from_secs(5))
            .expect("execute on a pending task must not block");
        assert!(task.is_pending());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn every_worker_waiting_on_a_synchronous_task_is_released() {
        let runs = counter();
        let seen = Arc::clone(&runs);
        let task = Task::builder()
            .manual_retry(true)
            .maximum_retries(3)
            .work(move |task: &Task| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    task.set_success(false);
                }
            })
            .synchronous();

        // First attempt fails and a second is owed; the starting worker stays blocked.
        let starter = task.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let started_tx = tx.clone();
        thread::spawn(move || {
            let _ = starter.start();
            let _ = started_tx.send("start");
        });
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while task.current_attempt() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(task.is_executing());

        // A second worker runs the owed attempt, which succeeds.
        let runner = task.clone();
        thread::spawn(move || {
            runner.execute();
            let _ = tx.send("execute");
        });

        let mut returned = vec![
            rx.recv_timeout(Duration::from_secs(5)).expect("first worker released"),
            rx.recv_timeout(Duration::from_secs(5)).expect("second worker released"),
        ];
        returned.sort();
        assert_eq!(returned, vec!["execute", "start"]);
        assert!(task.is_finished());
        assert!(task.success());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn progress_is_clamped() {
        let task = Task::empty();
        task.set_progress(150);
        assert_eq!(task.progress(), 100);
        task.set_progress(-5);
        assert_eq!(task.progress(), 0);
        task.set_progress(42);
        assert_eq!(task.progress(), 42);
    }

    #[test]
    fn dependencies_are_deduplicated_and_never_self() {
        let a = Task::empty();
        let b = Task::empty();
        b.add_dependency(&a);
        b.add_dependency(&a);
        b.add_dependency(&b);
        assert_eq!(b.dependencies(), vec![a]);
    }

    #[test]
    fn completion_handler_runs_once_for_unqueued_task() {
        let calls = counter();
        let seen = Arc::clone(&calls);
        let task = Task::builder()
            .on_complete(move |task: &Task| {
                assert!(task.is_finished());
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let completion = task.completion();
        task.start().unwrap();
        task.start().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(completion.is_complete());
    }

    #[test]
    fn work_hooks_are_called() {
        #[derive(Default)]
        struct Hooks {
            cancels: AtomicU32,
            pauses: AtomicU32,
            resumes: AtomicU32,
        }

        struct Recorder(Arc<Hooks>);

        impl Work for Recorder {
            fn run(&self, _task: &Task) {}

            fn on_cancel(&self, _task: &Task) {
                self.0.cancels.fetch_add(1, Ordering::SeqCst);
            }

            fn on_pause(&self, _task: &Task) {
                self.0.pauses.fetch_add(1, Ordering::SeqCst);
            }

            fn on_resume(&self, _task: &Task) {
                self.0.resumes.fetch_add(1, Ordering::SeqCst);
            }
        }

        let hooks = Arc::new(Hooks::default());
        let task = Task::new(Recorder(Arc::clone(&hooks)));
        task.pause();
        task.resume();
        task.cancel();
        task.cancel();

        assert_eq!(hooks.pauses.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.resumes.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn claim_is_exclusive() {
        let task = Task::empty();
        task.claim_for_queue().unwrap();
        assert!(matches!(
            task.claim_for_queue(),
            Err(QueueError::AlreadyQueued(_))
        ));
        task.release_claim();
        assert!(task.claim_for_queue().is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_until_finished_resolves_after_settlement() {
        let task = Task::builder().manual_finish(true).work(|_: &Task| {}).build();
        task.start().unwrap();

        let finisher = task.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            finisher.finish(true);
        });

        tokio::time::timeout(Duration::from_secs(5), task.wait_until_finished())
            .await
            .unwrap();
        assert!(task.is_finished());
    }
}
