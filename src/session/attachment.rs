//! Transport attachments.
//!
//! An attachment is one physical connection currently carrying a session's
//! frames: a long-poll response, a streaming response, a WebSocket. Its
//! lifecycle belongs to the transport; the session only sends frames to it
//! and is told when it goes away.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

// ============================================================================
// TransportAttachment
// ============================================================================

/// A connection able to carry session frames.
///
/// Identity is the `Arc` allocation: detaching compares pointers, so a
/// transport must keep the same `Arc` it registered.
pub trait TransportAttachment: Send + Sync {
    /// Sends one frame of wire text.
    ///
    /// Must not block. Delivery failures are the transport's concern; it
    /// reports them by detaching.
    fn send_frame(&self, frame: &str);
}

// ============================================================================
// RegisterOutcome
// ============================================================================

/// What [`Session::register`](crate::Session::register) did with an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The attachment now carries the session.
    Attached,
    /// Another attachment is live; this one was sent a `2010` close frame.
    Rejected,
    /// The session is closed; this attachment was sent a `3000` close frame
    /// and is no longer attached.
    Closed,
}

impl RegisterOutcome {
    /// Returns `true` if the attachment stays attached.
    #[inline]
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        matches!(self, Self::Attached)
    }
}

// ============================================================================
// AttachmentState
// ============================================================================

/// Which attachment, if any, currently carries the session.
#[derive(Default)]
pub(crate) enum AttachmentState {
    /// Between transports.
    #[default]
    Detached,
    /// Serving traffic through the attachment.
    Attached(Arc<dyn TransportAttachment>),
}

impl AttachmentState {
    /// Returns a handle to the live attachment.
    pub(crate) fn current(&self) -> Option<Arc<dyn TransportAttachment>> {
        match self {
            Self::Detached => None,
            Self::Attached(attachment) => Some(Arc::clone(attachment)),
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        matches!(self, Self::Attached(_))
    }

    /// Returns `true` if `attachment` is the live one.
    pub(crate) fn holds(&self, attachment: &Arc<dyn TransportAttachment>) -> bool {
        match self {
            Self::Detached => false,
            Self::Attached(current) => {
                std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(attachment))
            }
        }
    }

    /// Moves to `Detached`, returning the attachment that was live.
    pub(crate) fn take(&mut self) -> Option<Arc<dyn TransportAttachment>> {
        match std::mem::take(self) {
            Self::Detached => None,
            Self::Attached(attachment) => Some(attachment),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::testing::RecordingAttachment;

    #[test]
    fn test_default_is_detached() {
        let state = AttachmentState::default();
        assert!(!state.is_attached());
        assert!(state.current().is_none());
    }

    #[test]
    fn test_holds_compares_identity() {
        let first: Arc<dyn TransportAttachment> = RecordingAttachment::new();
        let second: Arc<dyn TransportAttachment> = RecordingAttachment::new();
        let state = AttachmentState::Attached(Arc::clone(&first));

        assert!(state.holds(&first));
        assert!(!state.holds(&second));
    }

    #[test]
    fn test_take_detaches() {
        let attachment: Arc<dyn TransportAttachment> = RecordingAttachment::new();
        let mut state = AttachmentState::Attached(attachment);

        assert!(state.take().is_some());
        assert!(!state.is_attached());
        assert!(state.take().is_none());
    }

    #[test]
    fn test_outcome_is_attached() {
        assert!(RegisterOutcome::Attached.is_attached());
        assert!(!RegisterOutcome::Rejected.is_attached());
        assert!(!RegisterOutcome::Closed.is_attached());
    }
}
