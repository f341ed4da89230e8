//! SockJS-style sessions - a duplex message stream over reattachable transports.
//!
//! This library emulates one persistent bidirectional socket on top of a
//! sequence of short-lived transport connections, with SockJS framing,
//! heartbeats, disconnect timeouts and backpressure.
//!
//! # Architecture
//!
//! A [`Session`] sits between the application and whichever transport is
//! currently carrying it:
//!
//! - **Application side**: writes messages, receives them through a data
//!   handler, pauses and resumes delivery
//! - **Transport side**: registers an attachment, feeds inbound payloads,
//!   detaches when its connection goes away
//!
//! Key design principles:
//!
//! - Timers come from an injected [`Scheduler`], never a global clock
//! - Handlers run with no session lock held, so they may call back in
//! - At most one attachment is live; a second one gets a `2010` close frame
//! - Flow control is a trait pair ([`FlowSink`] / [`FlowSource`]) that any
//!   stream can implement and a [`Pump`] can connect
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use sockjs_session::{Result, ServerOptions, SessionServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Echo every message back to its sender
//!     let server = SessionServer::bind(ServerOptions::new(), |session| {
//!         let echo = session.clone();
//!         session.data_handler(Some(Arc::new(move |chunk: Bytes| echo.write(chunk))));
//!     })
//!     .await?;
//!
//!     println!("Listening on {}", server.ws_url());
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`flow`] | Flow-control contracts and [`Pump`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Frames, escaping, payload parsing |
//! | [`scheduler`] | Timer service: [`TokioScheduler`], [`ManualScheduler`] |
//! | [`session`] | [`Session`] state machine and builder |
//! | [`transport`] | WebSocket server carrying sessions |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Flow control between producers and consumers.
pub mod flow;

/// Type-safe identifiers.
pub mod identifiers;

/// Session wire protocol.
///
/// Frames, quote escaping and the inbound payload parser.
pub mod protocol;

/// Timer service injected into sessions.
pub mod scheduler;

/// Reattachable framed sessions.
///
/// Use [`Session::builder()`] to create a session.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Flow types
pub use flow::{DataHandler, DrainHandler, EndHandler, FlowSink, FlowSource, Pump};

// Identifier types
pub use identifiers::SessionId;

// Protocol types
pub use protocol::{CloseReason, Frame, ParseMode};

// Scheduler types
pub use scheduler::{ManualScheduler, Scheduler, TimerId, TokioScheduler};

// Session types
pub use session::{RegisterOutcome, Session, SessionBuilder, SessionOptions, TransportAttachment};

// Transport types
pub use transport::{ServerOptions, SessionRegistry, SessionServer, WebSocketAttachment};
