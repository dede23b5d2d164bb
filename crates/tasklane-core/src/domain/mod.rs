//! Domain model (IDs, task state, snapshots).

pub mod ids;
pub mod snapshot;
pub mod state;

pub use ids::{QueueId, TaskId};
pub use snapshot::{QueueSnapshot, TaskSnapshot};
pub use state::TaskState;
