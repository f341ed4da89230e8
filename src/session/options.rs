//! Session configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sockjs_session::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_heartbeat_period(Duration::from_secs(10))
//!     .with_timeout(Duration::from_secs(30))
//!     .with_max_queue_chars(16 * 1024);
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::ParseMode;

// ============================================================================
// Constants
// ============================================================================

/// Default interval between heartbeat frames.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(25);

/// Default grace period for reattachment after a transport detaches.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default outbound queue ceiling, in characters.
pub const DEFAULT_MAX_QUEUE_CHARS: usize = 64 * 1024;

// ============================================================================
// SessionOptions
// ============================================================================

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Interval between heartbeat frames.
    pub heartbeat_period: Duration,

    /// How long a detached session waits for a new attachment.
    ///
    /// `None` waits forever.
    pub timeout: Option<Duration>,

    /// Outbound queue size, in characters, at which the session reports
    /// itself full.
    pub max_queue_chars: usize,

    /// How inbound payloads are tokenized.
    pub parse_mode: ParseMode,
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options with the default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            timeout: Some(DEFAULT_TIMEOUT),
            max_queue_chars: DEFAULT_MAX_QUEUE_CHARS,
            parse_mode: ParseMode::Quoted,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the heartbeat period.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Sets the disconnect timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables the disconnect timeout.
    #[inline]
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets the outbound queue ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_queue_chars(mut self, max: usize) -> Self {
        self.max_queue_chars = max;
        self
    }

    /// Sets the inbound payload parser.
    #[inline]
    #[must_use]
    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = mode;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the heartbeat period is zero
    /// - [`Error::InvalidArgument`] if the queue ceiling is zero
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_period.is_zero() {
            return Err(Error::config("heartbeat period must be greater than zero"));
        }
        if self.max_queue_chars < 1 {
            return Err(Error::invalid_argument("max queue size must be >= 1"));
        }
        Ok(())
    }

    /// Returns `true` if detached sessions eventually time out.
    #[inline]
    #[must_use]
    pub const fn has_timeout(&self) -> bool {
        self.timeout.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options.heartbeat_period, Duration::from_secs(25));
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.max_queue_chars, 65536);
        assert_eq!(options.parse_mode, ParseMode::Quoted);
        assert!(options.has_timeout());
    }

    #[test]
    fn test_builder_chain() {
        let options = SessionOptions::new()
            .with_heartbeat_period(Duration::from_millis(500))
            .without_timeout()
            .with_max_queue_chars(10)
            .with_parse_mode(ParseMode::Json);

        assert_eq!(options.heartbeat_period, Duration::from_millis(500));
        assert!(!options.has_timeout());
        assert_eq!(options.max_queue_chars, 10);
        assert_eq!(options.parse_mode, ParseMode::Json);
    }

    #[test]
    fn test_validate_zero_heartbeat() {
        let options = SessionOptions::new().with_heartbeat_period(Duration::ZERO);
        assert!(matches!(options.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_zero_queue() {
        let options = SessionOptions::new().with_max_queue_chars(0);
        assert!(matches!(
            options.validate(),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_is_valid() {
        let options = SessionOptions::new().with_timeout(Duration::ZERO);
        assert!(options.validate().is_ok());
    }
}
