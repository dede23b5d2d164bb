use crate::task::Task;

/// The execution body of a task.
///
/// `run` is invoked once per attempt on a worker thread; it may block. The
/// task handle lets the body report failure (`set_success(false)`), progress,
/// or completion (`finish`, when the task uses manual finish), and observe
/// cancellation (`is_cancelled`).
///
/// The hooks let a domain task abort or suspend in-flight work (an HTTP
/// request, a child process, ...) without losing task state.
///
/// # Example
/// ```ignore
/// struct Download { url: String }
///
/// impl Work for Download {
///     fn run(&self, task: &Task) {
///         if fetch(&self.url).is_err() {
///             task.set_success(false);
///         }
///     }
///
///     fn on_cancel(&self, _task: &Task) {
///         abort_fetch(&self.url);
///     }
/// }
/// ```
pub trait Work: Send + Sync + 'static {
    fn run(&self, task: &Task);

    fn on_cancel(&self, _task: &Task) {}

    fn on_pause(&self, _task: &Task) {}

    fn on_resume(&self, _task: &Task) {}
}

impl<F> Work for F
where
    F: Fn(&Task) + Send + Sync + 'static,
{
    fn run(&self, task: &Task) {
        self(task)
    }
}
