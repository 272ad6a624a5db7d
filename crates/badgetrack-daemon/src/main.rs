//! badgetrack Daemon
//!
//! Reads detection events from one or more RFID readers, records detected
//! tags in `SQLite` and fans tag events out to connected observers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

use badgetrack_core::config::{self, Config};
use badgetrack_daemon::dispatch::Dispatcher;
use badgetrack_daemon::notify::{EventHub, Notification};
use badgetrack_daemon::reader::{
    LineSettings, ReaderSettings, ReaderSource, ReconnectPolicy, run_source,
};
use badgetrack_daemon::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "badgetrack-daemon")]
#[command(version, about = "badgetrack daemon - RFID reader ingestion and tag events")]
struct Args {
    /// Reader source: serial device path, `tcp://host:port`, or `-` for stdin.
    /// May be repeated; each source gets its own connection.
    #[arg(long = "source", short = 's')]
    sources: Vec<String>,

    /// Serial line speed
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Do not run `stty` on serial devices before reading
    #[arg(long)]
    no_stty: bool,

    /// Database file path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Largest unterminated object buffered per connection, in bytes
    #[arg(long)]
    max_pending_bytes: Option<usize>,

    /// Consecutive failed reopen attempts before a source is abandoned
    /// (0 disables reopening; unlimited when unset)
    #[arg(long)]
    max_reconnects: Option<u32>,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "BADGETRACK_LOG_JSON")]
    log_json: bool,

    /// Log every broadcast tag event.
    #[arg(long)]
    log_events: bool,

    /// Print every stored tag as JSON, most recently seen first, and exit.
    #[arg(long)]
    list_tags: bool,

    /// OpenTelemetry OTLP endpoint for traces and metrics export
    /// (e.g. `http://localhost:4317`). Requires the `metrics` feature.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "BADGETRACK_METRICS_ENDPOINT")]
    metrics_endpoint: Option<String>,
}

impl Args {
    /// CLI flags take precedence over every config layer.
    fn apply(&self, config: &mut Config) {
        if !self.sources.is_empty() {
            config.reader.sources.clone_from(&self.sources);
        }
        if let Some(baud_rate) = self.baud_rate {
            config.reader.baud_rate = baud_rate;
        }
        if self.no_stty {
            config.reader.configure_line = false;
        }
        if let Some(path) = &self.db_path {
            config.storage.database_path = Some(path.clone());
        }
        if let Some(n) = self.max_pending_bytes {
            config.reader.max_pending_bytes = n;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
    }

    fn reconnect_policy(&self) -> ReconnectPolicy {
        match self.max_reconnects {
            Some(0) => ReconnectPolicy::disabled(),
            max_attempts => ReconnectPolicy {
                max_attempts,
                ..ReconnectPolicy::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let project_dir = std::env::current_dir().ok();
    let mut config = config::load_config(project_dir.as_deref())?;
    args.apply(&mut config);

    let log_filter = format!(
        "badgetrack_daemon={0},badgetrack_core={0}",
        config.log_level
    );
    #[cfg(feature = "metrics")]
    let metrics_guard = badgetrack_core::tracing_init::init_tracing_with_metrics(
        &log_filter,
        args.log_json,
        args.metrics_endpoint.as_deref(),
    );
    #[cfg(not(feature = "metrics"))]
    badgetrack_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let db_path = match &config.storage.database_path {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).await?;

    if args.list_tags {
        return print_tags(&db).await;
    }

    let sources = config
        .reader
        .sources
        .iter()
        .map(|s| s.parse::<ReaderSource>())
        .collect::<Result<Vec<_>, _>>()?;
    if sources.is_empty() {
        anyhow::bail!("No reader sources configured (use --source or BADGETRACK_SOURCES)");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        sources = sources.len(),
        baud_rate = config.reader.baud_rate,
        known_tags = db.count_tags().await?,
        "Starting badgetrack-daemon"
    );

    let hub = EventHub::new(config.notify.broadcast_capacity);
    let tap = args.log_events.then(|| spawn_event_tap(hub.subscribe()));
    let dispatcher = Arc::new(Dispatcher::new(db, hub));

    let settings = ReaderSettings {
        line: LineSettings {
            baud_rate: config.reader.baud_rate,
            configure_line: config.reader.configure_line,
        },
        read_buffer_bytes: config.reader.read_buffer_bytes,
        max_pending_bytes: config.reader.max_pending_bytes,
        reconnect: args.reconnect_policy(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut readers = JoinSet::new();
    for source in sources {
        let settings = settings.clone();
        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown_rx.clone();
        readers.spawn(async move {
            run_source(&source, &settings, &dispatcher, shutdown).await;
        });
    }

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        () = drain(&mut readers) => {
            info!("All reader sources closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    // Readers finish the frame in flight before observing this.
    let _ = shutdown_tx.send(true);
    drain(&mut readers).await;
    if let Some(tap) = tap {
        tap.abort();
    }

    let counts = dispatcher.counts();
    info!(
        detected = counts.detected,
        removed = counts.removed,
        unrecognized = counts.unrecognized,
        malformed = counts.malformed,
        persist_failed = counts.persist_failed,
        "Daemon stopped"
    );

    #[cfg(feature = "metrics")]
    if let Some(guard) = metrics_guard
        && let Err(e) = guard.shutdown()
    {
        warn!(error = %e, "Failed to flush telemetry");
    }

    Ok(())
}

async fn drain(readers: &mut JoinSet<()>) {
    while let Some(result) = readers.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Reader task failed");
        }
    }
}

#[allow(clippy::print_stdout)]
async fn print_tags(db: &Database) -> anyhow::Result<()> {
    let tags = db.list_tags().await?;
    println!("{}", serde_json::to_string_pretty(&tags)?);
    Ok(())
}

/// Log every broadcast event until the hub goes away.
fn spawn_event_tap(mut rx: broadcast::Receiver<Notification>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(n) => info!(
                    sequence = n.sequence,
                    event = %n.event,
                    payload = %n.payload,
                    "Tag event"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event tap lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

/// Default database path: the platform config dir, else ~/.badgetrack/tags.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = config::database_path() {
        return Ok(path);
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".badgetrack").join("tags.db"))
}
