//! Implementations of the ports.
//!
//! - **TokioPool**: `WorkerPool` backed by a tokio runtime (the default pool
//!   of every queue)

pub mod tokio_pool;

pub use self::tokio_pool::TokioPool;
