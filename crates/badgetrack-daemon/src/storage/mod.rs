//! `SQLite` storage for the badgetrack daemon.
//!
//! Persists tag detections. Implements the core [`TagStore`] seam.
//!
//! [`TagStore`]: badgetrack_core::TagStore

mod db;
mod queries;

pub use badgetrack_core::TagRecord;
pub use db::{Database, DatabaseError};
