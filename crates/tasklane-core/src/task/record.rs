//! Task record: the mutable part of a task.
//!
//! Design:
//! - One record per task, behind the task's lock; every state transition
//!   happens through a method here.
//! - Flags that look like booleans on the outside (`is_executing`,
//!   `is_finished`) are derived from the single `state` field.

use chrono::{DateTime, Utc};

use crate::domain::TaskState;

/// Result of trying to begin an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStart {
    /// Run the body now.
    Run { attempt: u32 },

    /// The task was cancelled while an attempt was owed; it is now finished.
    Settled,

    /// Nothing to do: not executing, or no attempt is owed.
    Idle,
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub state: TaskState,

    /// Outcome of the most recent attempt.
    pub success: bool,

    /// 1-indexed; only advances on a failed, retryable attempt.
    pub current_attempt: u32,

    /// An attempt is owed: true initially and after a retryable failure.
    pub attempt_pending: bool,

    /// An automatic execution loop currently owns the task.
    pub driving: bool,

    /// The execution body is running right now.
    pub in_body: bool,

    /// Claimed by a queue (a task belongs to at most one).
    pub queued: bool,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for TaskRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRecord {
    pub fn new() -> Self {
        Self {
            state: TaskState::Pending,
            success: true,
            current_attempt: 1,
            attempt_pending: true,
            driving: false,
            in_body: false,
            queued: false,
            started_at: None,
            finished_at: None,
        }
    }

    /// Pending -> Executing. Returns false if the task was not pending.
    pub fn mark_started(&mut self) -> bool {
        if !self.state.is_startable() {
            return false;
        }
        self.state = TaskState::Executing;
        self.started_at = Some(Utc::now());
        true
    }

    /// Terminal transition.
    pub fn mark_finished(&mut self) {
        self.state = TaskState::Finished;
        self.attempt_pending = false;
        self.finished_at = Some(Utc::now());
    }

    /// Record a failed attempt that will be retried.
    pub fn schedule_retry(&mut self, next_attempt: u32) {
        self.current_attempt = next_attempt;
        self.attempt_pending = true;
    }

    /// Claim the owed attempt, if any.
    ///
    /// Only an executing task runs attempts. A cancelled task never starts
    /// another one; if one was owed the task settles here instead.
    pub fn begin_attempt(&mut self, cancelled: bool) -> AttemptStart {
        if self.state != TaskState::Executing || !self.attempt_pending {
            return AttemptStart::Idle;
        }
        if cancelled {
            self.mark_finished();
            return AttemptStart::Settled;
        }
        self.attempt_pending = false;
        self.in_body = true;
        self.success = true;
        AttemptStart::Run {
            attempt: self.current_attempt,
        }
    }

    /// Is the task parked between attempts, with nothing in flight?
    pub fn is_awaiting_attempt(&self) -> bool {
        self.state == TaskState::Executing && self.attempt_pending && !self.in_body && !self.driving
    }
}
