//! Blocking counting semaphore.
//!
//! Used to make a worker thread wait for a completion that is reported from
//! somewhere else (another thread, a timer, an async task). Each `signal`
//! releases at most one `wait`; signals that arrive before anyone waits are
//! banked and consumed by later waits.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of [`Semaphore::wait_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Signaled,
    TimedOut,
}

impl WaitResult {
    pub fn is_timed_out(self) -> bool {
        matches!(self, WaitResult::TimedOut)
    }
}

#[derive(Debug, Default)]
struct Counter {
    /// Banked signals not yet consumed by a wait.
    permits: usize,
    /// Threads currently blocked in `wait`.
    waiters: usize,
}

/// Cloning shares the same counter.
#[derive(Debug, Clone, Default)]
pub struct Semaphore {
    inner: Arc<(Mutex<Counter>, Condvar)>,
}

impl Semaphore {
    /// Semaphore with no banked signals: the first `wait` blocks.
    pub fn new() -> Self {
        Self::with_permits(0)
    }

    /// Semaphore guarding a pool of `permits` resources.
    pub fn with_permits(permits: usize) -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(Counter {
                    permits,
                    waiters: 0,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Block until a signal is available.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut counter = lock.lock();
        counter.waiters += 1;
        while counter.permits == 0 {
            cvar.wait(&mut counter);
        }
        counter.permits -= 1;
        counter.waiters -= 1;
    }

    /// Block until a signal is available or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitResult {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut counter = lock.lock();
        counter.waiters += 1;
        while counter.permits == 0 {
            if cvar.wait_until(&mut counter, deadline).timed_out() && counter.permits == 0 {
                counter.waiters -= 1;
                return WaitResult::TimedOut;
            }
        }
        counter.permits -= 1;
        counter.waiters -= 1;
        WaitResult::Signaled
    }

    /// Release one waiter (or bank the signal).
    ///
    /// Returns non-zero when a blocked thread was woken, zero otherwise.
    pub fn signal(&self) -> usize {
        let (lock, cvar) = &*self.inner;
        let mut counter = lock.lock();
        counter.permits += 1;
        let woke = counter.waiters > 0;
        drop(counter);
        if woke {
            cvar.notify_one();
            1
        } else {
            0
        }
    }

    /// Banked signals (diagnostics and tests).
    pub fn available(&self) -> usize {
        self.inner.0.lock().permits
    }
}
