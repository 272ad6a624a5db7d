//! Reader events and the collaborators they are routed to.
//!
//! Frames are parsed into [`ReaderEvent`]s with a tolerant reader: unknown
//! fields are ignored and unknown event names become [`ReaderEvent::Unknown`].
//! Dispatching an event yields an [`Outcome`]; side effects go through the
//! [`TagStore`] and [`Notifier`] seams.

mod parser;
mod types;

use std::future::Future;

use serde_json::Value;

use crate::db::DatabaseError;

pub use parser::{parse_frame, parse_value};
pub use types::*;

/// Broadcast event name for a persisted detection.
pub const TAG_DETECTED: &str = "tag_detected";
/// Broadcast event name for a card leaving the reader field.
pub const TAG_REMOVED: &str = "tag_removed";

/// Persistence collaborator: detections keyed by tag identifier.
pub trait TagStore: Send + Sync {
    /// Create the tag if unseen, otherwise refresh its last-seen timestamp.
    ///
    /// The stored timestamp never moves backwards: the latest observation wins.
    fn upsert_detection(
        &self,
        tag_id: &str,
        observed_at: i64,
        metadata: &TagMetadata,
    ) -> impl Future<Output = Result<TagRecord, DatabaseError>> + Send;

    /// Fetch the canonical record for a tag, if it has ever been seen.
    fn lookup_by_tag(
        &self,
        tag_id: &str,
    ) -> impl Future<Output = Result<Option<TagRecord>, DatabaseError>> + Send;
}

/// Notification collaborator: fire-and-forget fan-out to connected observers.
pub trait Notifier: Send + Sync {
    fn broadcast(&self, event: &str, payload: Value);
}
