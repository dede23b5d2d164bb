//! Retry policy: the authoritative completion decision.

use crate::config::TaskOptions;

/// What `finish` does with the attempt that just ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The task is done: it succeeded, ran out of attempts, or was cancelled.
    Finish,

    /// Another attempt is warranted; the attempt counter advances.
    Retry { next_attempt: u32 },
}

/// Execution policy of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, initial attempt included.
    pub maximum_retries: u32,

    /// Further attempts only happen through explicit `retry` calls.
    pub manual_retry: bool,

    /// The body reports completion itself through `finish`.
    pub manual_finish: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&TaskOptions::default())
    }
}

impl From<&TaskOptions> for RetryPolicy {
    fn from(options: &TaskOptions) -> Self {
        Self {
            maximum_retries: options.maximum_retries,
            manual_retry: options.manual_retry,
            manual_finish: options.manual_finish,
        }
    }
}

impl RetryPolicy {
    /// Decide the fate of an attempt.
    ///
    /// # Arguments
    /// * `current_attempt` - attempt that just ended (1-indexed).
    /// * `success` - what the attempt reported.
    /// * `cancelled` - cancellation pre-empts any remaining attempts.
    ///
    /// Pure function: the caller applies the result to the task record.
    pub fn decide(&self, current_attempt: u32, success: bool, cancelled: bool) -> Settlement {
        if success || cancelled || current_attempt >= self.maximum_retries {
            Settlement::Finish
        } else {
            Settlement::Retry {
                next_attempt: current_attempt + 1,
            }
        }
    }
}
