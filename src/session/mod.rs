//! Reattachable framed sessions.
//!
//! A session outlives the transports carrying it. Polling transports come
//! and go between requests; streaming transports hold on longer. The
//! session keeps ordering, buffering and liveness across all of them.
//!
//! # Frame Lifecycle
//!
//! ```text
//! first register ──► "o" ──► on_open(session)
//! write(m) ────────► queued ──► a[...] on the live attachment
//! every period ────► "h" if attached
//! close() ─────────► c[3000,"Go away!"] on the next registration
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `attachment` | [`TransportAttachment`] contract and [`RegisterOutcome`] |
//! | `builder` | [`SessionBuilder`] |
//! | `core` | [`Session`] state machine |
//! | `options` | [`SessionOptions`] and defaults |

// ============================================================================
// Submodules
// ============================================================================

/// Transport attachment contract.
pub mod attachment;

/// Session builder.
pub mod builder;

/// Session state machine.
pub mod core;

/// Session options.
pub mod options;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use attachment::{RegisterOutcome, TransportAttachment};
pub use builder::SessionBuilder;
pub use core::{OpenHandler, Session, TimeoutHandler};
pub use options::{
    DEFAULT_HEARTBEAT_PERIOD, DEFAULT_MAX_QUEUE_CHARS, DEFAULT_TIMEOUT, SessionOptions,
};
