//! Test doubles shared by the session and pump tests.

use std::sync::Arc;

use parking_lot::Mutex;

use super::attachment::TransportAttachment;

/// Attachment that records every frame it is sent.
#[derive(Default)]
pub(crate) struct RecordingAttachment {
    frames: Mutex<Vec<String>>,
}

impl RecordingAttachment {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Frames received so far, oldest first.
    pub(crate) fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// Frames other than heartbeats.
    pub(crate) fn data_frames(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .filter(|frame| frame.as_str() != "h")
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, frame: &str) -> usize {
        self.frames.lock().iter().filter(|f| f.as_str() == frame).count()
    }
}

impl TransportAttachment for RecordingAttachment {
    fn send_frame(&self, frame: &str) {
        self.frames.lock().push(frame.to_string());
    }
}
