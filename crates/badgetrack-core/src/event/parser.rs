//! Frame parser for reader messages.
//!
//! Implements tolerant reader pattern: unknown fields ignored, unknown events
//! surfaced as [`ReaderEvent::Unknown`].

use serde_json::Value;

use super::types::*;
use crate::error::{Error, Result};
use crate::framing::Frame;

/// Parse a single frame extracted from the serial stream.
pub fn parse_frame(frame: &Frame) -> Result<ReaderEvent> {
    let raw: Value = serde_json::from_str(frame.as_str())?;
    if !raw.is_object() {
        return Err(Error::FrameParse("Frame is not a JSON object".into()));
    }
    Ok(parse_value(&raw))
}

/// Classify a JSON object by its `event` field.
pub fn parse_value(raw: &Value) -> ReaderEvent {
    let event = raw.get("event").and_then(Value::as_str);

    match event {
        Some("card_detected") => match tag_id(raw) {
            Some(tag_id) => ReaderEvent::CardDetected(Detection {
                tag_id,
                metadata: parse_metadata(raw),
            }),
            None => unknown(event, raw),
        },
        Some("card_removed") => match tag_id(raw) {
            Some(tag_id) => ReaderEvent::CardRemoved { tag_id },
            None => unknown(event, raw),
        },
        _ => unknown(event, raw),
    }
}

/// `uid` is what the firmware sends; `tagId` is accepted as an alias.
fn tag_id(raw: &Value) -> Option<String> {
    ["uid", "tagId"]
        .iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .find(|id| !id.is_empty())
        .map(String::from)
}

fn parse_metadata(raw: &Value) -> TagMetadata {
    TagMetadata {
        tag_type: raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        size: raw.get("size").and_then(Value::as_i64).unwrap_or(0),
    }
}

fn unknown(event: Option<&str>, raw: &Value) -> ReaderEvent {
    ReaderEvent::Unknown {
        event: event.map(String::from),
        payload: raw.clone(),
    }
}
