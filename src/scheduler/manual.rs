//! Virtual-clock scheduler for deterministic tests.
//!
//! Time only moves when [`ManualScheduler::advance`] is called. Due timers
//! fire in deadline order (ties by creation order) on the caller's thread,
//! with no lock held, so callbacks may schedule or cancel other timers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! use sockjs_session::scheduler::{ManualScheduler, Scheduler};
//!
//! let scheduler = ManualScheduler::new();
//! let fired = Arc::new(AtomicUsize::new(0));
//! let hits = Arc::clone(&fired);
//! scheduler.every(Duration::from_secs(1), Box::new(move || {
//!     hits.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! scheduler.advance(Duration::from_millis(3500));
//! assert_eq!(fired.load(Ordering::SeqCst), 3);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Scheduler, TimerCallback, TimerId};

// ============================================================================
// Types
// ============================================================================

/// A pending timer.
struct ManualTimer {
    /// Virtual time the timer fires next.
    due: Duration,
    /// Repeat period, `None` for one-shot timers.
    period: Option<Duration>,
    /// Taken out while the callback runs.
    callback: Option<TimerCallback>,
}

/// Clock and timer table.
#[derive(Default)]
struct ClockState {
    now: Duration,
    next_id: u64,
    timers: FxHashMap<TimerId, ManualTimer>,
}

// ============================================================================
// ManualScheduler
// ============================================================================

/// Scheduler driven by an explicit virtual clock.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl ManualScheduler {
    /// Creates a scheduler at virtual time zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time.
    #[inline]
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Returns the number of live timers.
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Returns `true` if the timer is still scheduled.
    #[inline]
    #[must_use]
    pub fn is_active(&self, id: TimerId) -> bool {
        self.state.lock().timers.contains_key(&id)
    }

    /// Moves the clock forward by `by`, firing every timer that comes due.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        while let Some((id, mut callback)) = self.take_next_due(target) {
            callback();
            self.finish(id, callback);
        }

        self.state.lock().now = target;
    }

    /// Pops the earliest timer due at or before `target`.
    ///
    /// One-shot timers leave the table; periodic timers stay with their
    /// callback slot empty until [`Self::finish`] puts it back.
    fn take_next_due(&self, target: Duration) -> Option<(TimerId, TimerCallback)> {
        let mut state = self.state.lock();

        let (id, due) = state
            .timers
            .iter()
            .filter(|(_, timer)| timer.callback.is_some() && timer.due <= target)
            .map(|(id, timer)| (*id, timer.due))
            .min_by_key(|(id, due)| (*due, *id))?;

        state.now = due;

        let timer = state.timers.get_mut(&id)?;
        let callback = timer.callback.take()?;
        if timer.period.is_none() {
            state.timers.remove(&id);
        }

        Some((id, callback))
    }

    /// Re-arms a periodic timer unless its callback cancelled it.
    fn finish(&self, id: TimerId, callback: TimerCallback) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timers.get_mut(&id)
            && let Some(period) = timer.period
        {
            timer.due += period;
            timer.callback = Some(callback);
        }
    }

    fn schedule(&self, delay: Duration, period: Option<Duration>, callback: TimerCallback) -> TimerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TimerId::new(state.next_id);
        let due = state.now + delay;
        state.timers.insert(
            id,
            ManualTimer {
                due,
                period,
                callback: Some(callback),
            },
        );
        id
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        self.schedule(delay, None, callback)
    }

    fn every(&self, period: Duration, callback: TimerCallback) -> TimerId {
        // A zero period would never let the clock move past the deadline.
        let period = period.max(Duration::from_nanos(1));
        self.schedule(period, Some(period), callback)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.state.lock().timers.remove(&id).is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
