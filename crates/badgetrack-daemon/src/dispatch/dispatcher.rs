//! Frame dispatcher.
//!
//! Routes each frame by its `event` discriminator:
//! - `card_detected`: upsert into the tag store, then broadcast the record
//! - `card_removed`: broadcast only, nothing is persisted
//! - anything else: logged and counted
//!
//! Work on one tag identifier is serialized across connections so the
//! persist/broadcast pair for a tag is never interleaved with another.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;
use tracing::{debug, info, warn};

use badgetrack_core::db::unix_timestamp;
use badgetrack_core::event::{Detection, TAG_DETECTED, TAG_REMOVED, parse_frame};
use badgetrack_core::{Frame, Notifier, Outcome, ReaderEvent, TagStore};

use super::KeyedLocks;

/// Snapshot of dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    pub detected: u64,
    pub removed: u64,
    pub unrecognized: u64,
    pub malformed: u64,
    pub persist_failed: u64,
}

#[derive(Default)]
struct Counters {
    detected: AtomicU64,
    removed: AtomicU64,
    unrecognized: AtomicU64,
    malformed: AtomicU64,
    persist_failed: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Detected(_) => &self.detected,
            Outcome::Removed { .. } => &self.removed,
            Outcome::Unrecognized { .. } => &self.unrecognized,
            Outcome::Malformed { .. } => &self.malformed,
            Outcome::PersistFailed { .. } => &self.persist_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            detected: self.detected.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
        }
    }
}

/// Routes frames to the persistence and notification collaborators.
///
/// Shared between reader connections behind an `Arc`; holds no per-connection
/// state.
pub struct Dispatcher<S, N> {
    store: S,
    notifier: N,
    locks: KeyedLocks,
    counters: Counters,
}

impl<S: TagStore, N: Notifier> Dispatcher<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            locks: KeyedLocks::new(),
            counters: Counters::default(),
        }
    }

    /// Dispatch one frame. Never fails: every problem becomes an [`Outcome`].
    pub async fn dispatch(&self, frame: &Frame) -> Outcome {
        let outcome = match parse_frame(frame) {
            Ok(event) => self.route(event).await,
            Err(e) => {
                warn!(error = %e, frame = %frame, "Dropping malformed frame");
                Outcome::Malformed {
                    reason: e.to_string(),
                }
            }
        };

        self.counters.record(&outcome);
        #[cfg(feature = "metrics")]
        badgetrack_core::metrics::record_outcome(outcome.kind());

        outcome
    }

    async fn route(&self, event: ReaderEvent) -> Outcome {
        match event {
            ReaderEvent::CardDetected(detection) => self.on_detected(detection).await,
            ReaderEvent::CardRemoved { tag_id } => {
                info!(tag_id = %tag_id, "Card removed");
                self.notifier
                    .broadcast(TAG_REMOVED, json!({ "tagId": tag_id }));
                Outcome::Removed { tag_id }
            }
            ReaderEvent::Unknown { event, .. } => {
                debug!(event = ?event, "Ignoring unrecognized reader event");
                Outcome::Unrecognized { event }
            }
        }
    }

    async fn on_detected(&self, detection: Detection) -> Outcome {
        let Detection { tag_id, metadata } = detection;
        let _guard = self.locks.lock(&tag_id).await;

        let observed_at = unix_timestamp();
        match self
            .store
            .upsert_detection(&tag_id, observed_at, &metadata)
            .await
        {
            Ok(record) => {
                info!(
                    tag_id = %record.tag_id,
                    detections = record.detection_count,
                    "Card detected"
                );
                match serde_json::to_value(&record) {
                    Ok(payload) => self.notifier.broadcast(TAG_DETECTED, payload),
                    Err(e) => warn!(tag_id = %tag_id, error = %e, "Failed to encode tag record"),
                }
                Outcome::Detected(record)
            }
            Err(e) => {
                warn!(tag_id = %tag_id, error = %e, "Failed to persist detection, dropping");
                Outcome::PersistFailed {
                    tag_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn counts(&self) -> DispatchCounts {
        self.counters.snapshot()
    }
}
