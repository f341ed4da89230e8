//! Session frames.
//!
//! Every frame is a single line of text:
//!
//! | Frame | Wire form | Sent when |
//! |-------|-----------|-----------|
//! | Open | `o` | first attachment of the session |
//! | Heartbeat | `h` | every heartbeat period, if attached |
//! | Data | `a["m1","m2"]` | flushing the outbound queue |
//! | Close | `c[3000,"Go away!"]` | closing or rejecting an attachment |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, Result};

use super::escape::escape;
use super::payload::{ParseMode, parse_messages};

// ============================================================================
// CloseReason
// ============================================================================

/// Close code and text carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Numeric close code.
    pub code: u16,
    /// Human readable reason.
    pub reason: Cow<'static, str>,
}

impl CloseReason {
    /// Normal application-initiated close.
    pub const GO_AWAY: Self = Self::new_static(3000, "Go away!");

    /// A second attachment tried to join a session that already has one.
    pub const ANOTHER_CONNECTION_OPEN: Self =
        Self::new_static(2010, "Another connection still open");

    /// Creates a close reason with a static text.
    #[inline]
    #[must_use]
    pub const fn new_static(code: u16, reason: &'static str) -> Self {
        Self {
            code,
            reason: Cow::Borrowed(reason),
        }
    }

    /// Creates a close reason with an owned text.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Cow::Owned(reason.into()),
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A single frame of the session wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `o`
    Open,
    /// `h`
    Heartbeat,
    /// `a[...]`, messages stored unescaped.
    Data(Vec<String>),
    /// `c[code,"reason"]`
    Close(CloseReason),
}

impl Frame {
    /// Wire form of the open frame.
    pub const OPEN: &'static str = "o";

    /// Wire form of the heartbeat frame.
    pub const HEARTBEAT: &'static str = "h";

    /// Encodes the frame to its wire text.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open => Self::OPEN.to_string(),
            Self::Heartbeat => Self::HEARTBEAT.to_string(),
            Self::Data(messages) => Self::data_from(messages.iter().map(String::as_str)),
            Self::Close(reason) => Self::close_text(reason),
        }
    }

    /// Encodes a data frame straight from borrowed messages.
    ///
    /// Messages are escaped and joined in iteration order.
    #[must_use]
    pub fn data_from<'a>(messages: impl IntoIterator<Item = &'a str>) -> String {
        let mut frame = String::from("a[");
        for (index, message) in messages.into_iter().enumerate() {
            if index > 0 {
                frame.push(',');
            }
            frame.push('"');
            frame.push_str(&escape(message));
            frame.push('"');
        }
        frame.push(']');
        frame
    }

    /// Encodes a close frame.
    #[must_use]
    pub fn close_text(reason: &CloseReason) -> String {
        format!("c[{},\"{}\"]", reason.code, reason.reason)
    }

    /// Decodes one frame of wire text.
    ///
    /// Data frame bodies are read with [`ParseMode::Quoted`].
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the frame type or close frame shape is unknown
    /// - [`Error::MalformedPayload`] if a data frame body cannot be parsed
    pub fn decode(text: &str) -> Result<Self> {
        match text {
            Self::OPEN => return Ok(Self::Open),
            Self::HEARTBEAT => return Ok(Self::Heartbeat),
            _ => {}
        }

        if let Some(body) = text.strip_prefix('a') {
            return parse_messages(body, ParseMode::Quoted).map(Self::Data);
        }

        if let Some(body) = text.strip_prefix('c') {
            return Self::decode_close(body).map(Self::Close);
        }

        Err(Error::protocol(format!("unknown frame: {text}")))
    }

    /// Returns `true` for the close frame.
    #[inline]
    #[must_use]
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Returns `true` if encoded wire text is a close frame.
    ///
    /// Only the frame type is looked at; the body is not parsed.
    #[inline]
    #[must_use]
    pub fn is_close_text(text: &str) -> bool {
        text.starts_with("c[")
    }

    /// Parses `[code,"reason"]`.
    fn decode_close(body: &str) -> Result<CloseReason> {
        let inner = body
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| Error::protocol(format!("close frame not bracketed: {body}")))?;

        let (code, reason) = inner
            .split_once(',')
            .ok_or_else(|| Error::protocol(format!("close frame missing reason: {body}")))?;

        let code = code
            .trim()
            .parse::<u16>()
            .map_err(|e| Error::protocol(format!("invalid close code '{code}': {e}")))?;

        let reason = reason
            .trim()
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(|| Error::protocol(format!("close reason not quoted: {body}")))?;

        Ok(CloseReason::new(code, reason))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_control_frames() {
        assert_eq!(Frame::Open.encode(), "o");
        assert_eq!(Frame::Heartbeat.encode(), "h");
    }

    #[test]
    fn test_encode_canonical_close_frames() {
        assert_eq!(
            Frame::Close(CloseReason::GO_AWAY).encode(),
            r#"c[3000,"Go away!"]"#
        );
        assert_eq!(
            Frame::Close(CloseReason::ANOTHER_CONNECTION_OPEN).encode(),
            r#"c[2010,"Another connection still open"]"#
        );
    }

    #[test]
    fn test_encode_data_escapes_and_joins() {
        let frame = Frame::Data(vec!["one".into(), r#"t"w"o"#.into()]);
        assert_eq!(frame.encode(), r#"a["one","t\"w\"o"]"#);
    }

    #[test]
    fn test_encode_empty_data() {
        assert_eq!(Frame::data_from(std::iter::empty()), "a[]");
    }

    #[test]
    fn test_decode_each_frame_kind() {
        assert_eq!(Frame::decode("o").unwrap(), Frame::Open);
        assert_eq!(Frame::decode("h").unwrap(), Frame::Heartbeat);
        assert_eq!(
            Frame::decode(r#"a["x","y \"z\""]"#).unwrap(),
            Frame::Data(vec!["x".into(), r#"y "z""#.into()])
        );
        assert_eq!(
            Frame::decode(r#"c[2010,"Another connection still open"]"#).unwrap(),
            Frame::Close(CloseReason::ANOTHER_CONNECTION_OPEN)
        );
        assert!(Frame::decode(r#"c[3000,"Go away!"]"#).unwrap().is_close());
        assert!(!Frame::decode("h").unwrap().is_close());
    }

    #[test]
    fn test_decode_unknown_frame() {
        let result = Frame::decode("z");
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_decode_bad_close() {
        assert!(Frame::decode("c[abc,\"x\"]").is_err());
        assert!(Frame::decode("c[3000]").is_err());
        assert!(Frame::decode("c3000,\"x\"").is_err());
    }

    #[test]
    fn test_is_close_text() {
        assert!(Frame::is_close_text(&Frame::close_text(&CloseReason::GO_AWAY)));
        assert!(!Frame::is_close_text(r#"a["c[3000,\"x\"]"]"#));
        assert!(!Frame::is_close_text(Frame::OPEN));
        assert!(!Frame::is_close_text(Frame::HEARTBEAT));
    }

    #[test]
    fn test_encode_decode_data() {
        let frame = Frame::Data(vec!["hello".into(), "\"quoted\"".into()]);
        assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
    }
}
