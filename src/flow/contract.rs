//! Flow-control contracts.
//!
//! A [`FlowSink`] consumes chunks and reports when its outbound queue is
//! saturated; a [`FlowSource`] produces chunks through a registered handler
//! and can be paused. [`Pump`](super::Pump) connects the two, and
//! [`Session`](crate::Session) implements both.
//!
//! Handlers are reference-counted closures so an implementation can clone
//! one out of its internal lock and call it with the lock released. A
//! handler may therefore call straight back into the stream that invoked it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

// ============================================================================
// Handler Types
// ============================================================================

/// Receives each chunk a source produces.
pub type DataHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// One-shot notification that a sink's queue has drained.
pub type DrainHandler = Arc<dyn Fn() + Send + Sync>;

/// Notification that a stream has ended.
pub type EndHandler = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// FlowSink
// ============================================================================

/// Consumer of chunks with a bounded outbound queue.
pub trait FlowSink: Send + Sync {
    /// Queues a chunk for writing.
    ///
    /// Never blocks; a full queue is reported through
    /// [`write_queue_full`](Self::write_queue_full), not by refusing the write.
    fn write(&self, chunk: Bytes);

    /// Returns `true` once the queue has reached its configured maximum.
    fn write_queue_full(&self) -> bool;

    /// Sets the queue maximum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// `max_size` is zero.
    fn set_write_queue_max_size(&self, max_size: usize) -> Result<()>;

    /// Replaces the drain handler; `None` clears it.
    ///
    /// The handler runs at most once, when the queue has shrunk to half the
    /// maximum or less, and is cleared before it runs.
    fn drain_handler(&self, handler: Option<DrainHandler>);
}

// ============================================================================
// FlowSource
// ============================================================================

/// Producer of chunks that can be paused.
pub trait FlowSource: Send + Sync {
    /// Replaces the data handler; `None` clears it.
    fn data_handler(&self, handler: Option<DataHandler>);

    /// Stops delivering chunks until [`resume`](Self::resume).
    fn pause(&self);

    /// Restarts delivery, first handing over anything held back while paused.
    fn resume(&self);
}
