// crates/mlf-scheduler/src/lib.rs

//! Node-download scheduling: a single trait plus four concrete strategy
//! values (conservative, balanced, aggressive, adaptive) rather than a class
//! hierarchy. Every strategy is a pure function of `(required chunks, shape,
//! state)`; `AdaptiveScheduler` is the one exception, holding internal
//! counters so it can tune itself across calls.
//!
//! All four satisfy the same five invariants: completeness (every required
//! chunk is covered by some decision), no redundancy within one call,
//! validity-awareness (already-valid chunks are only ever covered as a
//! byproduct of picking a larger ancestor node), node legality, and priority
//! monotonicity (required-serving decisions all precede pure prefetch).

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

mod adaptive;
mod aggressive;
mod balanced;
mod conservative;
mod support;

pub use adaptive::AdaptiveScheduler;
pub use aggressive::AggressiveScheduler;
pub use balanced::DefaultScheduler;
pub use conservative::ConservativeScheduler;

use mlf_core::{Result, SchedulingDecision, SchedulingTarget, Shape, ValidityView};

/// A strategy that maps required chunks (or a byte range) to an ordered
/// list of node-download decisions.
pub trait Scheduler: Send + Sync {
    /// Decide how to cover `required_chunks`, consulting `state` only to
    /// judge whether coalescing into a larger node would waste bytes on
    /// chunks that are not already valid.
    fn select_optimal_nodes(
        &self,
        required_chunks: &[u32],
        shape: &Shape,
        state: &dyn ValidityView,
    ) -> Result<Vec<SchedulingDecision>>;

    /// Compute the required-missing chunks in `[offset, offset+length)` and
    /// delegate to [`Scheduler::select_optimal_nodes`].
    fn analyze_scheduling_decisions(
        &self,
        offset: u64,
        length: u64,
        shape: &Shape,
        state: &dyn ValidityView,
    ) -> Result<Vec<SchedulingDecision>> {
        let required = support::missing_chunks_in_range(offset, length, shape, state);
        self.select_optimal_nodes(&required, shape, state)
    }

    /// Side-effecting entry point used by the painter: analyze, then push
    /// one [`mlf_core::NodeDownloadTask`] per decision into `target`.
    fn schedule_downloads(
        &self,
        offset: u64,
        length: u64,
        shape: &Shape,
        state: &dyn ValidityView,
        target: &dyn SchedulingTarget,
    ) -> Result<()> {
        for decision in self.analyze_scheduling_decisions(offset, length, shape, state)? {
            target.enqueue(support::task_for_node(shape, decision.node_index)?);
        }
        Ok(())
    }
}
