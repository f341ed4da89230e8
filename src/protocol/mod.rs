//! Session wire protocol.
//!
//! This module defines the textual frames exchanged between a session and
//! its client, the escaping applied to message bodies, and the parser for
//! inbound payloads.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `o` | Server → Client | Session opened |
//! | `h` | Server → Client | Heartbeat |
//! | `a[...]` | Server → Client | Batch of messages |
//! | `c[code,"text"]` | Server → Client | Session closed / attachment refused |
//! | `"m"` or `["m1",...]` | Client → Server | Inbound messages |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `escape` | Quote-only escaping of message bodies |
//! | `frame` | Frame and close reason types |
//! | `payload` | Inbound payload tokenizer |

// ============================================================================
// Submodules
// ============================================================================

/// Quote-only escaping.
pub mod escape;

/// Frame types and encoding.
pub mod frame;

/// Inbound payload parsing.
pub mod payload;

// ============================================================================
// Re-exports
// ============================================================================

pub use escape::{escape, unescape};
pub use frame::{CloseReason, Frame};
pub use payload::{ParseMode, parse_messages};
