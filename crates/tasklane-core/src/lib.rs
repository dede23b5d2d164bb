//! tasklane-core
//!
//! Retryable, cancellable tasks and the queues that run them.
//!
//! # Modules
//! - **domain**: identifiers, task state, queue snapshots
//! - **task**: the task state machine and its variants (concurrent, synchronous, group)
//! - **queue**: `TaskQueue`, chaining, pause/resume, dependency graph
//! - **ports**: the worker-pool boundary a queue executes on
//! - **impls**: `TokioPool`, the default pool
//! - **sync**: blocking semaphore used by synchronous tasks
//! - **app**: process-scoped shared queue
//! - **config** / **error**: configuration structs and `QueueError`

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod sync;
pub mod task;

pub use app::{App, AppBuilder};
pub use config::{AppConfig, QueueConfig, ServiceLevel, TaskOptions};
pub use domain::{QueueId, QueueSnapshot, TaskId, TaskSnapshot, TaskState};
pub use error::QueueError;
pub use queue::{QueueBuilder, TaskQueue};
pub use task::{Task, TaskBuilder, Work};
