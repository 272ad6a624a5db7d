//! `badgetrack` Core Library
//!
//! Shared functionality for `badgetrack` components:
//! - Frame extraction from the reader's serial byte stream
//! - Reader event parsing and dispatch outcome types
//! - Persistence and notification collaborator traits
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod framing;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{Notifier, Outcome, ReaderEvent, TagMetadata, TagRecord, TagStore};
pub use framing::{Frame, FrameExtractor, extract};
