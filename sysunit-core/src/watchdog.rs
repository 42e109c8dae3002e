//! Completion tracking and watchdog expiry for running TBeans.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sysunit_types::TBeanId;
use thiserror::Error;

/// TBeans did not finish before the watchdog deadline.
///
/// The TBeans named in `pending` were still running when the deadline passed.
/// They are not stopped; the caller only stopped waiting for them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("watchdog expired after {}ms with {} tbean(s) still running: {}", .timeout.as_millis(), .pending.len(), PendingList(.pending))]
pub struct WatchdogError {
    timeout: Duration,
    pending: BTreeSet<TBeanId>,
}

impl WatchdogError {
    /// Create a watchdog error.
    pub fn new(timeout: Duration, pending: BTreeSet<TBeanId>) -> Self {
        Self { timeout, pending }
    }

    /// The deadline that expired, exactly as supplied to the wait.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The deadline in milliseconds.
    pub fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// TBeans still running at expiry.
    pub fn pending(&self) -> &BTreeSet<TBeanId> {
        &self.pending
    }

    /// Whether `id` was still running at expiry.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|p| p.as_str() == id)
    }
}

struct PendingList<'a>(&'a BTreeSet<TBeanId>);

impl fmt::Display for PendingList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", id)?;
        }
        Ok(())
    }
}

/// Tracks which TBeans have not finished yet.
///
/// The manager arms an id before spawning its thread; the thread finishes
/// it after successful completion. Waiters block until nothing is pending or
/// their deadline passes.
#[derive(Debug, Default)]
pub struct CompletionLatch {
    pending: Mutex<BTreeSet<TBeanId>>,
    finished: Condvar,
}

impl CompletionLatch {
    /// Create a latch with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    fn pending_set(&self) -> MutexGuard<'_, BTreeSet<TBeanId>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `id` as running.
    pub fn arm(&self, id: &TBeanId) {
        self.pending_set().insert(id.clone());
    }

    /// Stop tracking `id` without signalling completion (its thread never started).
    pub fn disarm(&self, id: &TBeanId) {
        self.pending_set().remove(id);
        self.finished.notify_all();
    }

    /// Mark `id` as finished and wake waiters.
    pub fn finish(&self, id: &TBeanId) {
        self.pending_set().remove(id);
        self.finished.notify_all();
    }

    /// Ids still pending right now.
    pub fn pending(&self) -> BTreeSet<TBeanId> {
        self.pending_set().clone()
    }

    /// Wait until nothing is pending or `timeout` elapses.
    ///
    /// On expiry returns the ids pending at that instant.
    pub fn wait(&self, timeout: Duration) -> Result<(), BTreeSet<TBeanId>> {
        let guard = self.pending_set();
        let (guard, result) = self
            .finished
            .wait_timeout_while(guard, timeout, |pending| !pending.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        if result.timed_out() && !guard.is_empty() {
            Err(guard.clone())
        } else {
            Ok(())
        }
    }
}
