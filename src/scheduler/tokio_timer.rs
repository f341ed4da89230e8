//! Tokio-backed scheduler.
//!
//! Every timer is a spawned task sleeping on `tokio::time`. Cancellation
//! aborts the task; a one-shot timer removes itself from the table before
//! running its callback, so cancelling a timer that already fired is a no-op.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

use crate::error::{Error, Result};

use super::{Scheduler, TimerCallback, TimerId};

// ============================================================================
// Types
// ============================================================================

/// Map of live timers to the tasks driving them.
type TimerTable = FxHashMap<TimerId, AbortHandle>;

// ============================================================================
// TokioScheduler
// ============================================================================

/// Scheduler running timers as tasks on a tokio runtime.
///
/// Dropping the scheduler aborts every timer it still owns.
pub struct TokioScheduler {
    /// Runtime the timer tasks are spawned on.
    handle: Handle,
    /// Live timers.
    timers: Arc<Mutex<TimerTable>>,
    /// Next timer number.
    next_id: AtomicU64,
}

impl TokioScheduler {
    /// Creates a scheduler spawning on the given runtime.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            timers: Arc::new(Mutex::new(TimerTable::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates a scheduler on the runtime of the calling task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::config(format!("no tokio runtime for scheduler: {e}")))?;
        Ok(Self::new(handle))
    }

    /// Returns the number of live timers.
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.timers.lock().len()
    }

    fn next_id(&self) -> TimerId {
        TimerId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, mut callback: TimerCallback) -> TimerId {
        let id = self.next_id();
        let timers = Arc::clone(&self.timers);

        // Hold the table lock across spawn so the task cannot remove its
        // entry before it is inserted.
        let mut table = self.timers.lock();
        let task = self.handle.spawn(async move {
            time::sleep(delay).await;
            if timers.lock().remove(&id).is_some() {
                trace!(%id, "One-shot timer fired");
                callback();
            }
        });
        table.insert(id, task.abort_handle());

        id
    }

    fn every(&self, period: Duration, mut callback: TimerCallback) -> TimerId {
        let id = self.next_id();
        // `interval_at` panics on a zero period.
        let period = period.max(Duration::from_nanos(1));

        let task = self.handle.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                trace!(%id, "Periodic timer fired");
                callback();
            }
        });
        self.timers.lock().insert(id, task.abort_handle());

        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        match self.timers.lock().remove(&id) {
            Some(task) => {
                task.abort();
                trace!(%id, "Timer cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.lock().drain() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
