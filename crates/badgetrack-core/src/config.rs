//! Configuration resolution for badgetrack.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/badgetrack/settings.json)
//! 3. Project config (.badgetrack/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the daemon binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::framing::DEFAULT_MAX_PENDING;

/// Complete badgetrack configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reader: ReaderConfig::default(),
            storage: StorageConfig::default(),
            notify: NotifyConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Serial reader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Reader sources: device paths, `tcp://host:port`, or `-` for stdin.
    pub sources: Vec<String>,
    /// Line speed applied to serial devices. ESP8266 firmware uses 115200.
    pub baud_rate: u32,
    /// Size of each transport read.
    pub read_buffer_bytes: usize,
    /// Largest unterminated object kept before it is discarded.
    pub max_pending_bytes: usize,
    /// Configure the tty line discipline with `stty` before reading.
    pub configure_line: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            baud_rate: 115_200,
            read_buffer_bytes: 1024,
            max_pending_bytes: DEFAULT_MAX_PENDING,
            configure_line: true,
        }
    }
}

/// Tag store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
}

/// Notification fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Events buffered per observer before a slow observer starts lagging.
    pub broadcast_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        merge_config(&mut config, read_layer(&global_path)?);
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".badgetrack").join("settings.json");
        if project_path.exists() {
            merge_config(&mut config, read_layer(&project_path)?);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("badgetrack").join("settings.json"))
}

/// Get the default tag database path.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("badgetrack").join("tags.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support"))
    }
    #[cfg(not(target_os = "macos"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
    }
}

/// One settings file. Only the fields it names override lower layers.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    reader: ReaderLayer,
    storage: StorageLayer,
    notify: NotifyLayer,
    log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReaderLayer {
    sources: Option<Vec<String>>,
    baud_rate: Option<u32>,
    read_buffer_bytes: Option<usize>,
    max_pending_bytes: Option<usize>,
    configure_line: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StorageLayer {
    database_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NotifyLayer {
    broadcast_capacity: Option<usize>,
}

/// Read a single settings file on top of the built-in defaults.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let mut config = Config::default();
    merge_config(&mut config, read_layer(path)?);
    Ok(config)
}

fn read_layer(path: &Path) -> Result<ConfigLayer> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: ConfigLayer) {
    let ConfigLayer {
        reader,
        storage,
        notify,
        log_level,
    } = overlay;

    if let Some(sources) = reader.sources {
        base.reader.sources = sources;
    }
    if let Some(baud_rate) = reader.baud_rate {
        base.reader.baud_rate = baud_rate;
    }
    if let Some(n) = reader.read_buffer_bytes {
        base.reader.read_buffer_bytes = n;
    }
    if let Some(n) = reader.max_pending_bytes {
        base.reader.max_pending_bytes = n;
    }
    if let Some(configure_line) = reader.configure_line {
        base.reader.configure_line = configure_line;
    }
    if let Some(path) = storage.database_path {
        base.storage.database_path = Some(path);
    }
    if let Some(capacity) = notify.broadcast_capacity {
        base.notify.broadcast_capacity = capacity;
    }
    if let Some(level) = log_level {
        base.log_level = level;
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("BADGETRACK_SOURCES") {
        config.reader.sources = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(n) = var("BADGETRACK_BAUD_RATE").and_then(|v| v.parse().ok()) {
        config.reader.baud_rate = n;
    }
    if let Some(n) = var("BADGETRACK_MAX_PENDING_BYTES").and_then(|v| v.parse().ok()) {
        config.reader.max_pending_bytes = n;
    }
    if let Some(val) = var("BADGETRACK_DB_PATH") {
        config.storage.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("BADGETRACK_LOG_LEVEL") {
        config.log_level = val;
    }
}
