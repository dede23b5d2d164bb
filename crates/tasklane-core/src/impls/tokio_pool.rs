//! TokioPool - `WorkerPool` on top of a tokio runtime.
//!
//! Each submitted unit gets its own tokio task which:
//! 1. waits for the unit's dependencies
//! 2. waits for admission (not suspended, under the concurrency limit)
//! 3. runs the unit while holding a slot guard
//!
//! Blocking execution bodies are moved onto tokio's blocking pool by the unit
//! itself, so the async workers only ever wait.
//!
//! Admission:
//! - `Gate` is the single source of truth for `running`, `limit` and
//!   `suspended`; every change to it is followed by `notify_waiters`.
//! - A waiter arms its `Notified` before checking the gate, so a release
//!   between the check and the `select!` is not lost.
//! - Suspension only stops admission. Units already holding a slot run on.
//!
//! Slot accounting:
//! - A slot is held for the whole `run` future, which for a queued task ends
//!   only after the task settled. A manual-finish task keeps its slot until
//!   `finish` is reported from wherever the body handed it off.
//! - `SlotGuard` and `InFlightGuard` give back their counts on drop, so a
//!   panicking or aborted unit cannot leak a slot.
//!
//! Cancellation:
//! - `cancel_all` swaps in a fresh token and cancels the old one. Units
//!   submitted earlier are released from their dependency and admission
//!   waits; units submitted afterwards are unaffected.
//! - A released unit still runs its `run` future, without a slot, so the
//!   queue can settle the task as cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::QueueError;
use crate::ports::{Completion, WorkUnit, WorkerPool};

#[derive(Debug, Clone, Copy)]
struct Gate {
    running: usize,
    limit: Option<usize>,
    suspended: bool,
}

impl Gate {
    fn can_admit(&self) -> bool {
        !self.suspended && self.limit.is_none_or(|limit| self.running < limit)
    }
}

struct PoolShared {
    gate: Mutex<Gate>,
    /// Woken whenever the gate may have opened.
    changed: Notify,
    /// Replaced on every `cancel_all`; units keep the token they were submitted under.
    cancel: Mutex<CancellationToken>,
    in_flight: watch::Sender<usize>,
}

impl PoolShared {
    /// Wait for a slot. `None` if the unit was released by cancellation first.
    async fn admit(self: &Arc<Self>, token: &CancellationToken) -> Option<SlotGuard> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut gate = self.gate.lock();
                if gate.can_admit() {
                    gate.running += 1;
                    return Some(SlotGuard {
                        shared: Arc::clone(self),
                    });
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = token.cancelled() => return None,
            }
        }
    }
}

/// Holds one concurrency slot; released on drop.
struct SlotGuard {
    shared: Arc<PoolShared>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.shared.gate.lock().running -= 1;
        self.shared.changed.notify_waiters();
    }
}

/// Counts a unit as in flight until dropped.
struct InFlightGuard {
    shared: Arc<PoolShared>,
}

impl InFlightGuard {
    fn new(shared: Arc<PoolShared>) -> Self {
        shared.in_flight.send_modify(|n| *n += 1);
        Self { shared }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

pub struct TokioPool {
    handle: Handle,
    shared: Arc<PoolShared>,
}

impl TokioPool {
    pub fn new(handle: Handle, limit: Option<usize>) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            handle,
            shared: Arc::new(PoolShared {
                gate: Mutex::new(Gate {
                    running: 0,
                    limit,
                    suspended: false,
                }),
                changed: Notify::new(),
                cancel: Mutex::new(CancellationToken::new()),
                in_flight,
            }),
        }
    }

    /// Pool bound to the runtime of the calling thread.
    pub fn current(limit: Option<usize>) -> Result<Self, QueueError> {
        let handle = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Ok(Self::new(handle, limit))
    }

    /// Units currently holding a slot.
    pub fn running(&self) -> usize {
        self.shared.gate.lock().running
    }
}

#[async_trait]
impl WorkerPool for TokioPool {
    fn submit(&self, unit: WorkUnit) {
        let in_flight = InFlightGuard::new(Arc::clone(&self.shared));
        let shared = Arc::clone(&self.shared);
        let token = shared.cancel.lock().clone();

        self.handle.spawn(async move {
            let _in_flight = in_flight;
            let WorkUnit {
                id,
                dependencies,
                run,
            } = unit;

            let released = tokio::select! {
                _ = join_all(dependencies.into_iter().map(Completion::wait)) => false,
                _ = token.cancelled() => true,
            };

            let slot = if released {
                None
            } else {
                shared.admit(&token).await
            };
            debug!(task = %id, admitted = slot.is_some(), "unit running");

            run.await;
            drop(slot);
        });
    }

    fn cancel_all(&self) {
        let previous = std::mem::take(&mut *self.shared.cancel.lock());
        previous.cancel();
    }

    fn set_concurrency_limit(&self, limit: Option<usize>) {
        self.shared.gate.lock().limit = limit;
        self.shared.changed.notify_waiters();
    }

    fn concurrency_limit(&self) -> Option<usize> {
        self.shared.gate.lock().limit
    }

    fn set_suspended(&self, suspended: bool) {
        self.shared.gate.lock().suspended = suspended;
        self.shared.changed.notify_waiters();
    }

    fn is_suspended(&self) -> bool {
        self.shared.gate.lock().suspended
    }

    fn in_flight(&self) -> usize {
        *self.shared.in_flight.borrow()
    }

    async fn drain(&self) {
        let mut rx = self.shared.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
