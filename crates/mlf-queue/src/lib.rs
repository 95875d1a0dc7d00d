// crates/mlf-queue/src/lib.rs

//! The scheduling target the painter drives: a pending-task FIFO, an
//! in-flight download dedup map, and a bounded completion history ring.
//!
//! A [`ChunkQueue`] is the one place "at most one in-flight transport
//! request per node" (spec §4.5/§5) is actually enforced. Schedulers never
//! see it directly — they emit [`mlf_core::SchedulingDecision`]s against a
//! `&dyn mlf_core::SchedulingTarget`, and [`ChunkQueue::execute_scheduling_with_tasks`]
//! is the one call site that turns a scheduling pass into the exact set of
//! futures a caller must await for its own read, regardless of what other
//! callers are scheduling concurrently.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

mod history;
mod inflight;
mod queue;
mod recorder;

pub use history::CompletionHistory;
pub use inflight::{InFlight, TaskOutcome};
pub use queue::{ChunkQueue, DEFAULT_CAPACITY, DEFAULT_HISTORY_CAPACITY};
