//! Reader transports and the per-connection ingestion loop.
//!
//! Every configured source runs as its own task with its own carry buffer;
//! the dispatcher is the only thing they share.

mod connection;
mod reconnect;
mod source;

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use badgetrack_core::{Notifier, TagStore};

use crate::dispatch::Dispatcher;

pub use connection::{ConnectionEnd, ConnectionSummary, ReaderConnection};
pub use reconnect::ReconnectPolicy;
pub use source::{BoxedReader, LineSettings, ReaderError, ReaderSource};

/// Settings shared by every reader task.
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub line: LineSettings,
    pub read_buffer_bytes: usize,
    pub max_pending_bytes: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            line: LineSettings::default(),
            read_buffer_bytes: 1024,
            max_pending_bytes: badgetrack_core::framing::DEFAULT_MAX_PENDING,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// A connection that stayed up this long resets the backoff.
const STABLE_CONNECTION: Duration = Duration::from_secs(60);

/// Read one source to completion, reopening it after failures.
pub async fn run_source<S: TagStore, N: Notifier>(
    source: &ReaderSource,
    settings: &ReaderSettings,
    dispatcher: &Dispatcher<S, N>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        let started = Instant::now();
        match source.open(settings.line).await {
            Ok(reader) => {
                let conn = ReaderConnection::new(
                    source.to_string(),
                    reader,
                    settings.read_buffer_bytes,
                    settings.max_pending_bytes,
                );
                let summary = conn.run(dispatcher, shutdown.clone()).await;
                if summary.end == ConnectionEnd::Shutdown || !source.is_reopenable().await {
                    return;
                }
            }
            Err(e) => warn!(source = %source, error = %e, "Failed to open reader source"),
        }

        if started.elapsed() > STABLE_CONNECTION {
            attempt = 0;
        }
        if !settings.reconnect.should_retry(attempt) {
            error!(source = %source, attempt, "Giving up on reader source");
            return;
        }

        let delay = settings.reconnect.delay_for_attempt(attempt);
        info!(source = %source, attempt, delay_ms = delay.as_millis(), "Reopening reader source");
        tokio::select! {
            () = sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notify::EventHub;
    use crate::storage::Database;

    #[tokio::test]
    async fn file_source_is_read_once_without_reconnect() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("capture.log");
        std::fs::write(
            &path,
            concat!(
                r#"{"event":"card_detected","uid":"A"}"#,
                "\n",
                r#"{"event":"card_detected","uid":"B"}"#,
                "\n",
            ),
        )
        .unwrap();

        let dispatcher = Dispatcher::new(Database::open_in_memory().await.unwrap(), EventHub::new(8));
        let settings = ReaderSettings {
            line: LineSettings {
                baud_rate: 115_200,
                configure_line: false,
            },
            reconnect: ReconnectPolicy::disabled(),
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(false);

        run_source(&ReaderSource::Serial(path), &settings, &dispatcher, rx).await;

        assert_eq!(dispatcher.counts().detected, 2);
        assert_eq!(dispatcher.store().count_tags().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn capture_file_is_not_replayed_under_unlimited_reconnects() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("capture.log");
        std::fs::write(&path, concat!(r#"{"event":"card_detected","uid":"A"}"#, "\n")).unwrap();

        let dispatcher = Dispatcher::new(Database::open_in_memory().await.unwrap(), EventHub::new(8));
        let settings = ReaderSettings {
            line: LineSettings {
                baud_rate: 115_200,
                configure_line: false,
            },
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                max_attempts: None,
            },
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(false);

        let source = ReaderSource::Serial(path);
        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            run_source(&source, &settings, &dispatcher, rx),
        )
        .await;
        assert!(finished.is_ok());

        assert_eq!(dispatcher.counts().detected, 1);
        let tag = dispatcher.store().find_tag("A").await.unwrap().unwrap();
        assert_eq!(tag.detection_count, 1);
    }

    #[tokio::test]
    async fn missing_source_gives_up_after_max_attempts() {
        let dispatcher = Dispatcher::new(Database::open_in_memory().await.unwrap(), EventHub::new(8));
        let settings = ReaderSettings {
            line: LineSettings {
                baud_rate: 115_200,
                configure_line: false,
            },
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                max_attempts: Some(2),
            },
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(false);

        let source = ReaderSource::Serial("/nonexistent/ttyUSB9".into());
        let finished =
            tokio::time::timeout(Duration::from_secs(5), run_source(&source, &settings, &dispatcher, rx))
                .await;
        assert!(finished.is_ok());
    }
}
