//! Inbound payload parsing.
//!
//! Clients only ever send a single quoted string (`"msg"`) or an array of
//! quoted strings (`["m1","m2"]`). Two readers are provided:
//!
//! - [`ParseMode::Quoted`] scans for quote characters, steps over any
//!   backslash pair inside a string (so `\\` before a closing quote does
//!   not swallow it) and unescapes with the quote-only scheme of
//!   [`super::escape`]. It is cheap and only accepts the two shapes above.
//! - [`ParseMode::Json`] runs `serde_json` restricted to the same two
//!   shapes, so every JSON escape (`\n`, `\\`, `é`) is decoded.
//!
//! Both report [`Error::MalformedPayload`] instead of guessing token
//! boundaries when the payload has any other shape.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::error::{Error, Result};

use super::escape::unescape;

// ============================================================================
// ParseMode
// ============================================================================

/// How inbound payloads are tokenized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Quote-aware scanner with quote-only unescaping.
    #[default]
    Quoted,
    /// Full JSON decoding of a string or an array of strings.
    Json,
}

// ============================================================================
// Public API
// ============================================================================

/// Splits an inbound payload into messages.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the payload is not a quoted string
/// or an array of quoted strings.
pub fn parse_messages(payload: &str, mode: ParseMode) -> Result<Vec<String>> {
    match mode {
        ParseMode::Quoted => parse_quoted(payload),
        ParseMode::Json => parse_json(payload),
    }
}

// ============================================================================
// Quoted Scanner
// ============================================================================

fn parse_quoted(payload: &str) -> Result<Vec<String>> {
    let trimmed = payload.trim();

    if trimmed.starts_with('"') {
        let (message, rest) = take_string(trimmed, 0)?;
        if !trimmed[rest..].trim().is_empty() {
            return Err(Error::malformed_payload(format!(
                "trailing data after string at offset {rest}"
            )));
        }
        return Ok(vec![message]);
    }

    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| {
            Error::malformed_payload("expected a quoted string or an array of quoted strings")
        })?;

    let mut messages = Vec::new();
    let mut pos = skip_whitespace(inner, 0);

    if pos == inner.len() {
        return Ok(messages);
    }

    loop {
        if !inner[pos..].starts_with('"') {
            return Err(Error::malformed_payload(format!(
                "expected '\"' at offset {}",
                pos + 1
            )));
        }

        let (message, end) = take_string(inner, pos)?;
        messages.push(message);

        pos = skip_whitespace(inner, end);
        if pos == inner.len() {
            return Ok(messages);
        }

        if !inner[pos..].starts_with(',') {
            return Err(Error::malformed_payload(format!(
                "expected ',' at offset {}",
                pos + 1
            )));
        }
        pos = skip_whitespace(inner, pos + 1);
    }
}

/// Reads the quoted string opening at byte `start` of `text`.
///
/// Returns the unescaped message and the offset just past the closing quote.
fn take_string(text: &str, start: usize) -> Result<(String, usize)> {
    let body_start = start + 1;
    let bytes = text.as_bytes();
    let mut i = body_start;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => {
                let message = unescape(&text[body_start..i]).into_owned();
                return Ok((message, i + 1));
            }
            _ => i += 1,
        }
    }

    Err(Error::malformed_payload(format!(
        "unterminated string starting at offset {start}"
    )))
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    let skipped = text[from..]
        .bytes()
        .take_while(u8::is_ascii_whitespace)
        .count();
    from + skipped
}

// ============================================================================
// JSON Reader
// ============================================================================

/// The two payload shapes clients send.
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePayload {
    One(String),
    Many(Vec<String>),
}

fn parse_json(payload: &str) -> Result<Vec<String>> {
    match serde_json::from_str::<WirePayload>(payload) {
        Ok(WirePayload::One(message)) => Ok(vec![message]),
        Ok(WirePayload::Many(messages)) => Ok(messages),
        Err(e) => Err(Error::malformed_payload(e.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
