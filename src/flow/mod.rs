//! Flow control between producers and consumers.
//!
//! # Backpressure Protocol
//!
//! ```text
//!  FlowSource ──chunk──► Pump ──write──► FlowSink
//!      ▲                  │                 │
//!      │    pause() ◄─────┘ queue full      │
//!      └── resume() ◄───── drain handler ◄──┘ queue ≤ max / 2
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `contract` | [`FlowSink`] / [`FlowSource`] traits and handler types |
//! | `pump` | [`Pump`] connecting any source to any sink |

// ============================================================================
// Submodules
// ============================================================================

/// Sink and source contracts.
pub mod contract;

/// Source-to-sink pump.
pub mod pump;

// ============================================================================
// Re-exports
// ============================================================================

pub use contract::{DataHandler, DrainHandler, EndHandler, FlowSink, FlowSource};
pub use pump::Pump;
