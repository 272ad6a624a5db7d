//! Stateful frame extractor.
//!
//! Keeps the carry buffer together with the scanner state (brace depth,
//! in-string flag, pending escape) so each chunk is scanned exactly once.
//! Only bytes belonging to an unterminated object are retained:
//! - depth 0: everything except `{` is chatter and is dropped on sight
//! - depth > 0: bytes accumulate until the matching `}` closes the frame
//!
//! An object that outgrows the pending limit is dropped together with the
//! rest of its bytes: scanning resumes once the dropped object closes or at
//! the next newline, whichever comes first. Nested objects in its tail are
//! never emitted on their own.
//!
//! The delimiter bytes (`{`, `}`, `"`, `\`, `\n`) are ASCII and never appear
//! inside a multi-byte UTF-8 sequence, so a chunk boundary that splits a
//! character needs no special handling.

use tracing::{debug, trace, warn};

use super::Frame;

/// Default cap on the bytes of a single unterminated object (64 KiB).
pub const DEFAULT_MAX_PENDING: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ScanState {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ScanState {
    /// Advance over one byte of an open object. Returns true when the byte
    /// closes the outermost object.
    fn step(&mut self, byte: u8) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match byte {
            b'\\' => self.escaped = true,
            b'"' => self.in_string = !self.in_string,
            b'{' if !self.in_string => self.depth += 1,
            b'}' if !self.in_string => {
                self.depth -= 1;
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }
}

/// Per-connection frame extractor.
///
/// Not shareable between connections: each transport owns one and feeds it
/// chunks in arrival order.
#[derive(Debug)]
pub struct FrameExtractor {
    /// Bytes of the object currently being assembled. Empty or starts with `{`.
    pending: Vec<u8>,
    state: ScanState,
    /// Skipping the tail of an object dropped for size.
    discarding: bool,
    max_pending: usize,
    overflows: u64,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExtractor {
    /// Create an extractor with the default pending limit.
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    /// Create an extractor that gives up on an object once it exceeds
    /// `max_pending` bytes without closing.
    pub const fn with_max_pending(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            state: ScanState {
                depth: 0,
                in_string: false,
                escaped: false,
            },
            discarding: false,
            max_pending,
            overflows: 0,
        }
    }

    /// Feed a chunk and return every frame it completes, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if self.discarding {
                if byte == b'\n' || self.state.step(byte) {
                    debug!("Resuming after discarded object");
                    self.discarding = false;
                    self.state = ScanState::default();
                }
                continue;
            }

            if self.state.depth == 0 {
                match byte {
                    b'{' => {
                        self.pending.clear();
                        self.pending.push(byte);
                        self.state.depth = 1;
                    }
                    // Clamp: a close with nothing open is chatter.
                    b'}' => trace!("Ignoring unmatched closing brace"),
                    _ => {}
                }
                continue;
            }

            self.pending.push(byte);
            if self.state.step(byte) {
                frames.push(Frame::from_bytes(&self.pending));
                self.pending.clear();
                continue;
            }

            if self.pending.len() > self.max_pending {
                self.overflows += 1;
                warn!(
                    pending_bytes = self.pending.len(),
                    max_pending = self.max_pending,
                    "Unterminated object exceeds limit, discarding"
                );
                self.pending.clear();
                self.discarding = true;
            }
        }

        frames
    }

    /// Bytes of the unterminated object currently buffered.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True when no object is open or being discarded.
    pub const fn is_idle(&self) -> bool {
        self.state.depth == 0 && !self.discarding
    }

    /// Number of objects dropped for exceeding the pending limit.
    pub const fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Drop any partial object and return to the idle state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.state = ScanState::default();
        self.discarding = false;
    }

    /// Consume the extractor, returning the unterminated tail.
    pub fn into_pending(self) -> Vec<u8> {
        self.pending
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn strs(frames: &[Frame]) -> Vec<&str> {
        frames.iter().map(Frame::as_str).collect()
    }

    fn feed_all(chunks: &[&[u8]]) -> Vec<Frame> {
        let mut extractor = FrameExtractor::new();
        chunks.iter().flat_map(|c| extractor.push(c)).collect()
    }

    #[test]
    fn single_object_in_one_chunk() {
        let frames = feed_all(&[br#"{"event":"card_detected","uid":"A"}"#]);
        assert_eq!(strs(&frames), vec![r#"{"event":"card_detected","uid":"A"}"#]);
    }

    #[test]
    fn back_to_back_objects_keep_order() {
        let frames = feed_all(&[
            br#"{"event":"card_detected","uid":"A"}{"event":"card_removed","uid":"A"}"#,
        ]);
        assert_eq!(
            strs(&frames),
            vec![
                r#"{"event":"card_detected","uid":"A"}"#,
                r#"{"event":"card_removed","uid":"A"}"#,
            ]
        );
    }

    #[test]
    fn braces_inside_strings_are_inert() {
        let frames = feed_all(&[br#"{"event":"x","note":"}{}{"}"#]);
        assert_eq!(strs(&frames), vec![r#"{"event":"x","note":"}{}{"}"#]);
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let input = br#"{"note":"say \"}\" twice","uid":"B"}"#;
        let frames = feed_all(&[input]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_str().as_bytes(), input);
    }

    #[test]
    fn escaped_backslash_before_quote_ends_string() {
        let input = br#"{"path":"C:\\","uid":"C"}"#;
        let frames = feed_all(&[input]);
        assert_eq!(frames.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(frames[0].as_str()).unwrap();
        assert_eq!(parsed["uid"], "C");
    }

    #[test]
    fn nested_objects_form_one_frame() {
        let frames = feed_all(&[br#"{"event":"x","meta":{"a":{"b":1}}}"#]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn escape_pending_across_chunk_boundary() {
        let frames = feed_all(&[br#"{"note":"a\"#, br#""}","uid":"D"}"#]);
        assert_eq!(strs(&frames), vec![r#"{"note":"a\"}","uid":"D"}"#]);
    }

    #[test]
    fn byte_at_a_time_matches_single_chunk() {
        let stream = concat!(
            "boot ok\r\n",
            r#"{"event":"card_detected","uid":"A","note":"}{\"}"}"#,
            "\n",
            r#"{"event":"card_removed","uid":"A"}"#,
            "\n",
            r#"{"event":"heartbeat","n":{"x":"\\"}}"#,
        )
        .as_bytes();

        let whole = feed_all(&[stream]);
        assert_eq!(whole.len(), 3);

        let mut extractor = FrameExtractor::new();
        let bytewise: Vec<Frame> = stream
            .iter()
            .flat_map(|b| extractor.push(std::slice::from_ref(b)))
            .collect();
        assert_eq!(bytewise, whole);
        assert!(extractor.is_idle());
    }

    #[test]
    fn every_two_way_split_matches_single_chunk() {
        let stream = br#"xx{"a":"\"{"}yy{"b":{"c":"}"}}{"d":1"#;
        let whole = feed_all(&[stream]);
        assert_eq!(whole.len(), 2);

        for split in 0..=stream.len() {
            let (head, tail) = stream.split_at(split);
            let mut extractor = FrameExtractor::new();
            let mut frames = extractor.push(head);
            frames.extend(extractor.push(tail));
            assert_eq!(frames, whole, "split at {split}");
            assert_eq!(extractor.pending(), br#"{"d":1"#, "split at {split}");
        }
    }

    #[test]
    fn chatter_between_objects_is_dropped() {
        let mut extractor = FrameExtractor::new();
        let frames = extractor.push(b"garbage \"quoted\" text\n{\"uid\":\"E\"} trailing");
        assert_eq!(strs(&frames), vec![r#"{"uid":"E"}"#]);
        assert!(extractor.pending().is_empty());
        assert!(extractor.is_idle());
    }

    #[test]
    fn unmatched_close_is_clamped() {
        let mut extractor = FrameExtractor::new();
        let frames = extractor.push(br#"}}}{"uid":"F"}}"#);
        assert_eq!(strs(&frames), vec![r#"{"uid":"F"}"#]);
        assert!(extractor.is_idle());

        let frames = extractor.push(br#"{"uid":"G"}"#);
        assert_eq!(strs(&frames), vec![r#"{"uid":"G"}"#]);
    }

    #[test]
    fn malformed_but_balanced_frame_is_still_a_frame() {
        let frames = feed_all(&[br#"{"event":"card_detected","uid":}{"uid":"H"}"#]);
        assert_eq!(
            strs(&frames),
            vec![r#"{"event":"card_detected","uid":}"#, r#"{"uid":"H"}"#]
        );
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut extractor = FrameExtractor::new();
        assert!(extractor.push(br#"{"note":"}"#).is_empty());
        let before = extractor.pending().to_vec();
        assert!(extractor.push(b"").is_empty());
        assert_eq!(extractor.pending(), before.as_slice());
        assert!(!extractor.is_idle());
    }

    #[test]
    fn utf8_split_across_chunks_is_preserved() {
        let input = "{\"name\":\"Jos\u{e9} \u{1F4B3}\"}".as_bytes();
        let mut extractor = FrameExtractor::new();
        let mut frames = Vec::new();
        for chunk in input.chunks(3) {
            frames.extend(extractor.push(chunk));
        }
        assert_eq!(strs(&frames), vec!["{\"name\":\"Jos\u{e9} \u{1F4B3}\"}"]);
    }

    #[test]
    fn invalid_utf8_passes_through_lossily() {
        let frames = feed_all(&[b"{\"uid\":\"\xFF\xFE\"}"]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].as_str().contains('\u{FFFD}'));
    }

    #[test]
    fn control_bytes_are_inert() {
        let frames = feed_all(&[b"\0\x01{\"uid\":\"\0I\"}\x7f"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_str(), "{\"uid\":\"\0I\"}");
    }

    #[test]
    fn oversized_object_is_discarded_and_recovers_at_newline() {
        let mut extractor = FrameExtractor::with_max_pending(16);
        assert!(extractor.push(br#"{"note":"this never closes"#).is_empty());
        assert_eq!(extractor.overflows(), 1);
        assert_eq!(extractor.pending_len(), 0);
        assert!(!extractor.is_idle());

        let frames = extractor.push(b"\n{\"uid\":\"J\"}");
        assert_eq!(strs(&frames), vec![r#"{"uid":"J"}"#]);
        assert!(extractor.is_idle());
    }

    #[test]
    fn nested_object_in_discarded_tail_is_not_emitted() {
        let mut extractor = FrameExtractor::with_max_pending(24);
        let frames = extractor.push(
            br#"{"event":"dump","padding":"0123456789abcdef","inner":{"event":"card_detected","uid":"X"}}{"uid":"L"}"#,
        );
        assert_eq!(extractor.overflows(), 1);
        assert_eq!(strs(&frames), vec![r#"{"uid":"L"}"#]);
        assert!(extractor.is_idle());
    }

    #[test]
    fn discarded_tail_split_across_chunks() {
        let mut extractor = FrameExtractor::with_max_pending(8);
        let mut frames = extractor.push(br#"{"a":"xxxxxxxx","b":{"#);
        frames.extend(extractor.push(br#""uid":"X"}}"#));
        frames.extend(extractor.push(br#"{"uid":"M"}"#));
        assert_eq!(strs(&frames), vec![r#"{"uid":"M"}"#]);
    }

    #[test]
    fn reset_drops_partial_state() {
        let mut extractor = FrameExtractor::new();
        extractor.push(br#"{"note":"open string"#);
        extractor.reset();
        assert!(extractor.is_idle());
        assert_eq!(extractor.pending_len(), 0);

        let frames = extractor.push(br#"{"uid":"K"}"#);
        assert_eq!(frames.len(), 1);
    }
}
