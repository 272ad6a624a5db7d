//! Reader event and outcome types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed message from the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    CardDetected(Detection),
    CardRemoved { tag_id: String },
    /// Unrecognized event name, or a recognized one missing its tag identifier.
    Unknown { event: Option<String>, payload: Value },
}

/// A card entering the reader field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub tag_id: String,
    pub metadata: TagMetadata,
}

/// Optional card details reported with a detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMetadata {
    /// Card family as reported by the reader (e.g. `MIFARE 1K`). Empty if absent.
    #[serde(rename = "type", default)]
    pub tag_type: String,
    /// Card memory size in bytes. Zero if absent.
    #[serde(default)]
    pub size: i64,
}

/// Canonical persisted tag record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub id: i64,
    pub tag_id: String,
    #[serde(rename = "type")]
    pub tag_type: String,
    pub size: i64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub detection_count: i64,
}

/// Result of dispatching a single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Detection persisted and broadcast.
    Detected(TagRecord),
    /// Removal broadcast; nothing persisted.
    Removed { tag_id: String },
    /// Parsed, but not an event we act on.
    Unrecognized { event: Option<String> },
    /// Frame did not parse as a JSON object.
    Malformed { reason: String },
    /// Persistence failed; no broadcast was issued.
    PersistFailed { tag_id: String, reason: String },
}

impl Outcome {
    /// Short label for logs and metrics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Detected(_) => "detected",
            Self::Removed { .. } => "removed",
            Self::Unrecognized { .. } => "unrecognized",
            Self::Malformed { .. } => "malformed",
            Self::PersistFailed { .. } => "persist_failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}
