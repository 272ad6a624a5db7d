//! Frame extraction for the reader's serial byte stream.
//!
//! The reader firmware writes JSON objects back to back, usually separated by
//! newlines, but nothing guarantees that a read from the serial link lines up
//! with object boundaries. This module recovers brace-balanced object
//! substrings ("frames") from arbitrarily chunked input, honouring string
//! quoting and backslash escapes so braces inside string values are never
//! mistaken for structure.

mod extractor;

use std::fmt;

pub use extractor::{DEFAULT_MAX_PENDING, FrameExtractor};

/// A brace-balanced top-level object extracted from the byte stream.
///
/// A frame is only guaranteed to balance at the top level; it may still fail
/// to parse as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame(String);

impl Frame {
    /// Decode raw frame bytes, replacing invalid UTF-8 sequences.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        Self(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for Frame {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Extract every complete frame from `carry` followed by `chunk`.
///
/// Returns the frames in stream order together with the new carry buffer,
/// which holds only the unterminated prefix of the next object (or nothing).
/// The carry buffer is rescanned from its start on every call; long-lived
/// connections should hold a [`FrameExtractor`] instead, which keeps its
/// scanner state between chunks.
///
/// Quote and escape tracking only runs inside an open object. Outside one,
/// `"` and `\` are chatter like any other byte, so boot noise with an odd
/// number of quotes cannot hide the next `{` from the scan.
pub fn extract(carry: &[u8], chunk: &[u8]) -> (Vec<Frame>, Vec<u8>) {
    let mut extractor = FrameExtractor::with_max_pending(usize::MAX);
    let mut frames = extractor.push(carry);
    frames.extend(extractor.push(chunk));
    (frames, extractor.into_pending())
}
