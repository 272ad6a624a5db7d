//! Error types for `badgetrack` core library.

use thiserror::Error;

/// Result type alias using `badgetrack` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `badgetrack` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame could not be turned into a reader event
    #[error("Failed to parse frame: {0}")]
    FrameParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
