//! Builder pattern for session construction.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sockjs_session::{ManualScheduler, Session};
//!
//! # fn example() -> sockjs_session::Result<()> {
//! let scheduler = Arc::new(ManualScheduler::new());
//! let session = Session::builder(scheduler)
//!     .heartbeat_period(Duration::from_secs(10))
//!     .timeout(Duration::from_secs(30))
//!     .on_open(|session| session.write("welcome"))
//!     .on_timeout(|id| println!("{id} timed out"))
//!     .build()?;
//!
//! assert!(!session.is_attached());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::ParseMode;
use crate::scheduler::Scheduler;

use super::core::{OpenHandler, Session, SessionParts, TimeoutHandler};
use super::options::SessionOptions;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
pub struct SessionBuilder {
    /// Timer service for heartbeat and timeout.
    scheduler: Arc<dyn Scheduler>,
    /// Explicit session ID; generated when unset.
    id: Option<SessionId>,
    /// Timing and queue settings.
    options: SessionOptions,
    /// First-attachment callback.
    on_open: Option<OpenHandler>,
    /// Expiry callback.
    on_timeout: Option<TimeoutHandler>,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("on_open", &self.on_open.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            id: None,
            options: SessionOptions::default(),
            on_open: None,
            on_timeout: None,
        }
    }

    /// Uses a specific session ID instead of a generated one.
    #[inline]
    #[must_use]
    pub fn id(mut self, id: SessionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the heartbeat period.
    #[inline]
    #[must_use]
    pub fn heartbeat_period(mut self, period: Duration) -> Self {
        self.options.heartbeat_period = period;
        self
    }

    /// Sets the disconnect timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Disables the disconnect timeout.
    #[inline]
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.options.timeout = None;
        self
    }

    /// Sets the outbound queue ceiling, in characters.
    #[inline]
    #[must_use]
    pub fn max_queue_chars(mut self, max: usize) -> Self {
        self.options.max_queue_chars = max;
        self
    }

    /// Sets the inbound payload parser.
    #[inline]
    #[must_use]
    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.options.parse_mode = mode;
        self
    }

    /// Sets the callback run once, on the first attachment.
    ///
    /// # Arguments
    ///
    /// * `handler` - Receives a handle to the opened session
    #[inline]
    #[must_use]
    pub fn on_open(mut self, handler: impl Fn(Session) + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(handler));
        self
    }

    /// Sets the callback run when the disconnect timeout elapses.
    ///
    /// # Arguments
    ///
    /// * `handler` - Receives the expired session's ID
    #[inline]
    #[must_use]
    pub fn on_timeout(mut self, handler: impl Fn(SessionId) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(handler));
        self
    }

    /// Builds the session and starts its heartbeat.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no open handler is set
    /// - [`Error::Config`] if the timeout is finite and no timeout handler is set
    /// - [`Error::Config`] if the heartbeat period is zero
    /// - [`Error::InvalidArgument`] if the queue ceiling is zero
    pub fn build(self) -> Result<Session> {
        self.options.validate()?;

        let on_open = self.on_open.ok_or_else(|| {
            Error::config(
                "Open handler is required. Use .on_open() to set it.\n\
                 Example: Session::builder(scheduler).on_open(|session| ...)",
            )
        })?;

        if self.options.has_timeout() && self.on_timeout.is_none() {
            return Err(Error::config(
                "Timeout handler is required when the timeout is finite. \
                 Use .on_timeout() or .without_timeout().",
            ));
        }

        Ok(Session::start(SessionParts {
            id: self.id.unwrap_or_else(SessionId::generate),
            scheduler: self.scheduler,
            heartbeat_period: self.options.heartbeat_period,
            timeout: self.options.timeout,
            max_queue_chars: self.options.max_queue_chars,
            parse_mode: self.options.parse_mode,
            on_open,
            on_timeout: self.on_timeout,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
