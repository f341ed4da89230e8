//! WebSocket attachment and per-connection loop.
//!
//! Each accepted WebSocket carries one session for its whole life. The
//! session sends frames through a [`WebSocketAttachment`], which hands them
//! to the connection task over a channel; the task writes them to the
//! socket and feeds inbound text messages back to the session.
//!
//! # Connection Loop
//!
//! The loop selects over two inputs:
//!
//! - Inbound WebSocket messages, parsed by [`Session::handle_messages`]
//! - Outbound frames queued by the attachment
//!
//! A close frame (`c[...]`) is the last thing written; the socket is closed
//! right after it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::session::{OpenHandler, Session, TransportAttachment};

use super::registry::SessionRegistry;

// ============================================================================
// AttachmentCommand
// ============================================================================

/// Internal commands for the connection loop.
#[derive(Debug)]
enum AttachmentCommand {
    /// Write a frame to the socket.
    Frame(String),
}

// ============================================================================
// WebSocketAttachment
// ============================================================================

/// Attachment backed by a WebSocket connection task.
///
/// Sending never blocks: frames go onto an unbounded channel drained by the
/// connection loop. Frames sent after the connection ended are dropped.
pub struct WebSocketAttachment {
    /// Channel to the connection loop.
    command_tx: mpsc::UnboundedSender<AttachmentCommand>,
}

impl WebSocketAttachment {
    /// Creates an attachment and the receiving end for its loop.
    fn channel() -> (Self, mpsc::UnboundedReceiver<AttachmentCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (Self { command_tx }, command_rx)
    }

    /// Returns `true` while the connection loop is running.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

impl TransportAttachment for WebSocketAttachment {
    fn send_frame(&self, frame: &str) {
        if self
            .command_tx
            .send(AttachmentCommand::Frame(frame.to_string()))
            .is_err()
        {
            trace!("Connection gone, frame dropped");
        }
    }
}

// ============================================================================
// Connection Handling
// ============================================================================

/// Upgrades a TCP stream and serves a new session over it until either side
/// closes.
///
/// The session is removed from `registry` when the connection ends.
///
/// # Errors
///
/// - [`Error::Connection`] if the WebSocket upgrade fails
/// - [`Error::MalformedPayload`] if the peer sends an unparsable payload
/// - [`Error::WebSocket`] on socket errors
pub(crate) async fn serve_connection(
    stream: TcpStream,
    registry: Arc<SessionRegistry>,
    on_open: OpenHandler,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

    let session = registry.create(on_open)?;
    let session_id = session.id();

    let (attachment, command_rx) = WebSocketAttachment::channel();
    let attachment: Arc<dyn TransportAttachment> = Arc::new(attachment);

    debug!(session_id = %session_id, "WebSocket session started");

    let outcome = session.register(Arc::clone(&attachment));
    trace!(session_id = %session_id, ?outcome, "Attachment registered");

    let result = run_connection_loop(ws_stream, command_rx, &session).await;

    session.detach(&attachment);
    registry.remove(session_id);

    debug!(session_id = %session_id, "WebSocket session ended");

    result
}

/// Pumps frames both ways until the socket or the session closes.
async fn run_connection_loop(
    ws_stream: WebSocketStream<TcpStream>,
    mut command_rx: mpsc::UnboundedReceiver<AttachmentCommand>,
    session: &Session,
) -> Result<()> {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Payloads from the peer
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = session.handle_messages(text.as_str()) {
                            warn!(session_id = %session.id(), error = %e, "Closing connection on bad payload");
                            let _ = ws_write.close().await;
                            return Err(e);
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!(session_id = %session.id(), "WebSocket closed by remote");
                        return Ok(());
                    }

                    Some(Err(e)) => {
                        return Err(e.into());
                    }

                    None => {
                        debug!(session_id = %session.id(), "WebSocket stream ended");
                        return Ok(());
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Frames from the session
            command = command_rx.recv() => {
                match command {
                    Some(AttachmentCommand::Frame(frame)) => {
                        let closing = Frame::is_close_text(&frame);
                        ws_write.send(Message::Text(frame.into())).await?;
                        if closing {
                            let _ = ws_write.close().await;
                            return Ok(());
                        }
                    }

                    None => {
                        let _ = ws_write.close().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_forwards_frames() {
        let (attachment, mut command_rx) = WebSocketAttachment::channel();
        attachment.send_frame("o");
        attachment.send_frame(r#"a["x"]"#);

        assert!(matches!(
            command_rx.try_recv(),
            Ok(AttachmentCommand::Frame(frame)) if frame == "o"
        ));
        assert!(matches!(
            command_rx.try_recv(),
            Ok(AttachmentCommand::Frame(frame)) if frame == r#"a["x"]"#
        ));
    }

    #[test]
    fn test_attachment_after_loop_ends() {
        let (attachment, command_rx) = WebSocketAttachment::channel();
        assert!(attachment.is_connected());

        drop(command_rx);
        assert!(!attachment.is_connected());
        attachment.send_frame("h");
    }
}
