//! Real-time event fan-out.
//!
//! Dispatch outcomes are broadcast to every connected observer. Delivery is
//! best-effort: a slow observer lags and skips events instead of holding
//! back the reader pipeline.

mod hub;

pub use hub::{EventHub, Notification};
