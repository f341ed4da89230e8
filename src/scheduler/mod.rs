//! Timer service injected into sessions.
//!
//! Sessions never reach for a global timer. Each one receives an
//! `Arc<dyn Scheduler>` at construction and uses it for its heartbeat and
//! disconnect-timeout timers.
//!
//! # Implementations
//!
//! | Type | Use |
//! |------|-----|
//! | [`TokioScheduler`] | Production: timers are tokio tasks |
//! | [`ManualScheduler`] | Tests: virtual clock advanced by hand |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

// ============================================================================
// Submodules
// ============================================================================

/// Virtual-clock scheduler.
pub mod manual;

/// Tokio-backed scheduler.
pub mod tokio_timer;

// ============================================================================
// Re-exports
// ============================================================================

pub use manual::ManualScheduler;
pub use tokio_timer::TokioScheduler;

// ============================================================================
// Types
// ============================================================================

/// Callback run when a timer fires.
///
/// Periodic timers call the same callback on every tick.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Wraps a raw timer number.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw timer number.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// One-shot and periodic timers with cancellation.
///
/// Callbacks run on the scheduler's own execution context and must not
/// block.
pub trait Scheduler: Send + Sync {
    /// Runs `callback` once after `delay`.
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Runs `callback` every `period`, first after one full period.
    fn every(&self, period: Duration, callback: TimerCallback) -> TimerId;

    /// Cancels a timer.
    ///
    /// Idempotent. Returns `true` if a live timer was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}
