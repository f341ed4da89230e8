//! Message escaping for data frames.
//!
//! The companion wire format only escapes the double quote: every `"` in an
//! outbound message becomes `\"`, and inbound text has `\"` turned back into
//! `"`. Nothing else is touched, not even a lone backslash.
//!
//! # Limitation
//!
//! Backslashes are never escaped, so the framed text is only valid JSON
//! when the message has no backslash in front of a quote. The message
//! `\"` is framed as `"\\""`, which a JSON-decoding peer reads as a
//! lone backslash followed by a stray quote. `unescape(escape(m)) == m`
//! still holds for every `m` on this side of the wire. Kept as-is for
//! byte-exact compatibility with existing clients.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

// ============================================================================
// Matchers
// ============================================================================

/// Matches a bare double quote.
static ESCAPER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"""#).expect("valid regex"));

/// Matches a backslash-escaped double quote.
static UNESCAPER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\\""#).expect("valid regex"));

// ============================================================================
// Functions
// ============================================================================

/// Escapes every `"` in `message` as `\"`.
///
/// Borrows when there is nothing to escape.
#[inline]
#[must_use]
pub fn escape(message: &str) -> Cow<'_, str> {
    ESCAPER.replace_all(message, r#"\""#)
}

/// Turns every `\"` in `message` back into `"`.
///
/// Borrows when there is nothing to unescape.
#[inline]
#[must_use]
pub fn unescape(message: &str) -> Cow<'_, str> {
    UNESCAPER.replace_all(message, r#"""#)
}

// ============================================================================
// Tests
// ============================================================================
