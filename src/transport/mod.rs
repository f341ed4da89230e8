//! WebSocket transport layer.
//!
//! Carries sessions over raw WebSocket connections so the session layer
//! can be exercised end to end.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  SessionServer  │                              │  Client         │
//! │                 │         WebSocket            │                 │
//! │  Registry       │◄────────────────────────────►│  "o", a[...],   │
//! │  → Session      │      ws://ip:port            │  h, c[...]      │
//! │  → Attachment   │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `SessionServer::bind` - Bind and start the accept loop
//! 2. Client connects; the connection task creates a session
//! 3. `WebSocketAttachment` is registered; `o` goes out
//! 4. Inbound text feeds `Session::handle_messages`
//! 5. Disconnect detaches the attachment and removes the session
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Concurrent map of live sessions |
//! | `server` | Listener and accept loop |
//! | `websocket` | Attachment and per-connection loop |

// ============================================================================
// Submodules
// ============================================================================

/// Session registry.
pub mod registry;

/// WebSocket session server.
pub mod server;

/// WebSocket attachment and connection loop.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::SessionRegistry;
pub use server::{ServerOptions, SessionServer};
pub use websocket::WebSocketAttachment;
