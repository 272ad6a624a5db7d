//! Event dispatch: frame → parsed reader event → side effects.
//!
//! Each frame is routed to exactly one handler and always yields an
//! [`Outcome`](badgetrack_core::Outcome); nothing here returns an error to the
//! reader connection.

mod dispatcher;
mod locks;

pub use dispatcher::{DispatchCounts, Dispatcher};
pub(crate) use locks::KeyedLocks;
