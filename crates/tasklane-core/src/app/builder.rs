//! AppBuilder - process-scoped wiring of the shared queue.
//!
//! Design:
//! - The shared queue is explicit state created once by `build`, not a
//!   hidden global; pass the `App` (or its queue) to whoever needs it.
//! - Fail-fast: configuration is validated and the runtime resolved in
//!   `build`, so a misconfigured process never starts accepting tasks.

use tokio::runtime::Handle;
use tracing::info;

use crate::config::{AppConfig, QueueConfig};
use crate::error::QueueError;
use crate::queue::TaskQueue;
use crate::task::Task;

/// # Example
/// ```ignore
/// let app = AppBuilder::new()
///     .config(AppConfig::from_path("tasklane.json")?)
///     .build()?;
/// app.add(Task::named("hello", |_: &Task| println!("hello")))?;
/// app.shutdown().await;
/// ```
pub struct AppBuilder {
    config: AppConfig,
    handle: Option<Handle>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            handle: None,
        }
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Runtime for every queue the app creates; defaults to the current one.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn build(self) -> Result<App, QueueError> {
        self.config.shared.validate()?;
        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| QueueError::NoRuntime)?,
        };
        let shared = TaskQueue::builder(self.config.shared.name.clone())
            .config(self.config.shared.clone())
            .handle(handle.clone())
            .build()?;
        info!(queue = %shared.name(), max_concurrent = ?shared.max_concurrent(), "app started");

        Ok(App {
            config: self.config,
            handle,
            shared,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct App {
    config: AppConfig,
    handle: Handle,
    shared: TaskQueue,
}

impl App {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The process-wide default queue.
    pub fn shared(&self) -> &TaskQueue {
        &self.shared
    }

    /// New queue on the app's runtime.
    pub fn queue(&self, config: QueueConfig) -> Result<TaskQueue, QueueError> {
        TaskQueue::builder(config.name.clone())
            .config(config)
            .handle(self.handle.clone())
            .build()
    }

    /// Submit to the shared queue.
    pub fn add(&self, task: Task) -> Result<(), QueueError> {
        self.shared.add(task)
    }

    /// Cancel everything on the shared queue and wait for it to drain.
    pub async fn shutdown(&self) {
        info!(queue = %self.shared.name(), "app shutting down");
        self.shared.cancel_all();
        self.shared.wait_until_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn build_without_runtime_fails() {
        assert!(matches!(AppBuilder::new().build(), Err(QueueError::NoRuntime)));
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.shared.max_concurrent = Some(0);
        let app = AppBuilder::new().config(config).build();
        assert!(matches!(app, Err(QueueError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shared_queue_uses_configuration() {
        let mut config = AppConfig::default();
        config.shared.max_concurrent = Some(3);
        let app = AppBuilder::new().config(config).build().unwrap();

        assert_eq!(app.shared().name(), "shared");
        assert_eq!(app.shared().max_concurrent(), Some(3));

        let other = app.queue(QueueConfig::named("other")).unwrap();
        assert_eq!(other.name(), "other");
        assert_eq!(other.max_concurrent(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_drains_the_shared_queue() {
        let app = AppBuilder::new().build().unwrap();
        app.shared().pause();
        let task = Task::named("never", |_: &Task| panic!("must not run"));
        app.add(task.clone()).unwrap();

        timeout(Duration::from_secs(5), app.shutdown()).await.unwrap();

        assert!(task.is_cancelled());
        assert!(task.is_finished());
        assert_eq!(app.shared().operation_count(), 0);
    }
}
