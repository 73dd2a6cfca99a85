//! Watermark timer scheduling (spec §4.3/§5): asset counters carry a
//! persisted `watermark_deadline`, but nothing re-evaluates that counter
//! once the deadline passes unless some other event for the same job
//! happens to arrive later. This crate owns the active side of that
//! contract — a `tokio::time::sleep`-backed task per outstanding counter
//! that nudges the counter's terminal check the moment its deadline
//! elapses, and a reconstruction pass that rebuilds those tasks from the
//! persisted deadlines on process start, since the tasks themselves don't
//! survive a restart.

pub mod scheduler;

pub use scheduler::{WatermarkScheduler, WatermarkSink};
