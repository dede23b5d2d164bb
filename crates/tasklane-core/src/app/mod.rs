//! App - process-scoped state.
//!
//! # Components
//! - **AppBuilder**: validates configuration and creates the shared queue
//! - **App**: owns the shared queue; hands out further queues

pub mod builder;

pub use self::builder::{App, AppBuilder};
