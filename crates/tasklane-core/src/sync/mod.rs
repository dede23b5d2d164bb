//! Synchronization primitives shared by task variants.

pub mod semaphore;

pub use semaphore::{Semaphore, WaitResult};
