//! A single reader connection: transport → frame extractor → dispatcher.
//!
//! One task per connection. Chunks are processed strictly in arrival order and
//! every frame's dispatch completes before the next read, so downstream
//! observers see events in stream order. Shutdown is only observed while
//! waiting for bytes, never between a frame's persist and its broadcast.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use badgetrack_core::{FrameExtractor, Notifier, TagStore};

use crate::dispatch::Dispatcher;

/// Why a connection stopped reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The transport reported end of stream.
    Eof,
    /// The transport failed.
    Error(String),
    /// The daemon is shutting down.
    Shutdown,
}

/// What a finished connection did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub end: ConnectionEnd,
    pub bytes_read: u64,
    pub frames: u64,
    /// Bytes of an unterminated object dropped when the connection ended.
    pub discarded_tail: usize,
    /// Objects dropped for exceeding the pending limit.
    pub overflows: u64,
}

/// Reader connection owning its transport and carry buffer.
pub struct ReaderConnection<R> {
    id: String,
    label: String,
    reader: R,
    extractor: FrameExtractor,
    read_buffer: usize,
}

impl<R: AsyncRead + Unpin + Send> ReaderConnection<R> {
    pub fn new(label: impl Into<String>, reader: R, read_buffer: usize, max_pending: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            reader,
            extractor: FrameExtractor::with_max_pending(max_pending),
            read_buffer: read_buffer.max(1),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read until the transport closes or shutdown is signalled.
    pub async fn run<S: TagStore, N: Notifier>(
        mut self,
        dispatcher: &Dispatcher<S, N>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ConnectionSummary {
        info!(connection = %self.id, source = %self.label, "Reader connection opened");

        let mut buf = vec![0u8; self.read_buffer];
        let mut bytes_read: u64 = 0;
        let mut frames_seen: u64 = 0;

        let end = loop {
            if *shutdown.borrow() {
                break ConnectionEnd::Shutdown;
            }

            let read = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break ConnectionEnd::Shutdown;
                    }
                    continue;
                }
                read = self.reader.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => break ConnectionEnd::Eof,
                Ok(n) => n,
                Err(e) => break ConnectionEnd::Error(e.to_string()),
            };
            bytes_read += n as u64;

            let frames = self.extractor.push(&buf[..n]);
            #[cfg(feature = "metrics")]
            badgetrack_core::metrics::record_frames(&self.label, frames.len() as u64);

            for frame in &frames {
                let outcome = dispatcher.dispatch(frame).await;
                debug!(connection = %self.id, outcome = %outcome, "Frame dispatched");
            }
            frames_seen += frames.len() as u64;
        };

        let discarded_tail = self.extractor.pending_len();
        if discarded_tail > 0 {
            debug!(
                connection = %self.id,
                bytes = discarded_tail,
                "Discarding unterminated object at connection close"
            );
        }

        match &end {
            ConnectionEnd::Error(e) => {
                warn!(connection = %self.id, source = %self.label, error = %e, "Reader connection failed");
            }
            _ => {
                info!(
                    connection = %self.id,
                    source = %self.label,
                    end = ?end,
                    bytes_read,
                    frames = frames_seen,
                    "Reader connection closed"
                );
            }
        }

        ConnectionSummary {
            end,
            bytes_read,
            frames: frames_seen,
            discarded_tail,
            overflows: self.extractor.overflows(),
        }
    }
}
