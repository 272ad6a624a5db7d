//! Byte sources a reader connection can consume.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use tokio::io::AsyncRead;
use tokio::process::Command;
use tracing::{debug, info};

/// Boxed transport handed to a [`ReaderConnection`](super::ReaderConnection).
pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Where reader bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderSource {
    /// Serial device node, e.g. `/dev/ttyUSB0`.
    Serial(PathBuf),
    /// TCP serial bridge (ser2net and friends), given as `tcp://host:port`.
    Tcp(String),
    /// Standard input, given as `-`.
    Stdin,
}

/// How a serial line is prepared before reading.
#[derive(Debug, Clone, Copy)]
pub struct LineSettings {
    pub baud_rate: u32,
    /// Run `stty` on the device. Disable for pre-configured lines or plain files.
    pub configure_line: bool,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            configure_line: true,
        }
    }
}

impl ReaderSource {
    /// Open the source for reading.
    pub async fn open(&self, line: LineSettings) -> Result<BoxedReader, ReaderError> {
        match self {
            Self::Serial(path) => {
                if line.configure_line {
                    configure_tty(path, line.baud_rate).await?;
                }
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| self.open_error(&e))?;
                info!(source = %self, baud_rate = line.baud_rate, "Serial device opened");
                Ok(Box::new(file))
            }
            Self::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr)
                    .await
                    .map_err(|e| self.open_error(&e))?;
                info!(source = %self, "Serial bridge connected");
                Ok(Box::new(stream))
            }
            Self::Stdin => Ok(Box::new(tokio::io::stdin())),
        }
    }

    /// Whether a closed source is worth reopening.
    ///
    /// Stdin and regular files end for good at EOF; reopening a capture file
    /// would replay every detection in it.
    pub async fn is_reopenable(&self) -> bool {
        match self {
            Self::Stdin => false,
            Self::Tcp(_) => true,
            // A device node that vanished (unplugged adapter) may come back.
            Self::Serial(path) => !tokio::fs::metadata(path)
                .await
                .is_ok_and(|meta| meta.is_file()),
        }
    }

    fn open_error(&self, e: &std::io::Error) -> ReaderError {
        ReaderError::Open {
            target: self.to_string(),
            reason: e.to_string(),
        }
    }
}

impl FromStr for ReaderSource {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ReaderError::InvalidSource(s.to_string()));
        }
        if s == "-" {
            return Ok(Self::Stdin);
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() || !addr.contains(':') {
                return Err(ReaderError::InvalidSource(s.to_string()));
            }
            return Ok(Self::Tcp(addr.to_string()));
        }
        Ok(Self::Serial(PathBuf::from(s)))
    }
}

impl fmt::Display for ReaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(path) => write!(f, "{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Stdin => f.write_str("-"),
        }
    }
}

/// Put the tty into raw mode at the requested speed.
async fn configure_tty(path: &Path, baud_rate: u32) -> Result<(), ReaderError> {
    let device_flag = if cfg!(target_os = "macos") { "-f" } else { "-F" };
    let mut cmd = Command::new("stty");
    cmd.arg(device_flag)
        .arg(path)
        .arg(baud_rate.to_string())
        .args(["raw", "-echo"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!(path = %path.display(), baud_rate, "Configuring serial line");
    let output = cmd.output().await.map_err(|e| ReaderError::LineConfig {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(ReaderError::LineConfig {
            path: path.display().to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Errors from opening reader sources.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("Invalid reader source: {0:?}")]
    InvalidSource(String),

    #[error("Failed to open {target}: {reason}")]
    Open { target: String, reason: String },

    #[error("Failed to configure serial line {path}: {reason}")]
    LineConfig { path: String, reason: String },
}
