//! Ports - boundaries to external collaborators.
//!
//! The engine only depends on these traits; concrete implementations live in
//! `impls`.

pub mod pool;

pub use self::pool::{Completion, WorkUnit, WorkerPool};
