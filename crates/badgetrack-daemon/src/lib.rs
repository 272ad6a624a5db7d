//! badgetrack Daemon Library
//!
//! Core functionality for the badgetrack daemon:
//! - Reader connections over serial, TCP bridge or stdin
//! - Frame dispatch to persistence and notification
//! - SQLite storage for detected tags
//! - Broadcast fan-out of tag events to observers

pub mod dispatch;
pub mod notify;
pub mod reader;
pub mod storage;
