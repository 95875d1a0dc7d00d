//! Tunables for the painter: worker concurrency, retry policy, and which
//! scheduling strategy to run. Kept as one small `Copy` struct the way the
//! scheduler strategies themselves are plain values rather than a builder.

use std::time::Duration;

use mlf_scheduler::{AdaptiveScheduler, AggressiveScheduler, ConservativeScheduler, DefaultScheduler, Scheduler};

/// Selects which [`Scheduler`] strategy a [`crate::Painter`] runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerChoice {
    /// One decision per missing leaf, nothing more.
    Conservative,
    /// Coalesces contiguous runs within a small waste budget.
    Balanced,
    /// Coalesces aggressively and prefetches ahead of the read head.
    Aggressive,
    /// Tunes itself between the other three from recent decision quality.
    Adaptive,
}

impl SchedulerChoice {
    /// Build the concrete strategy this choice names.
    #[must_use]
    pub fn build(self) -> Box<dyn Scheduler> {
        match self {
            Self::Conservative => Box::new(ConservativeScheduler),
            Self::Balanced => Box::new(DefaultScheduler),
            Self::Aggressive => Box::new(AggressiveScheduler::default()),
            Self::Adaptive => Box::new(AdaptiveScheduler::new()),
        }
    }
}

/// Painter tunables: concurrency, retry policy, queue/history sizing, and
/// scheduler choice.
#[derive(Clone, Debug)]
pub struct PainterConfig {
    /// Maximum number of `fetch_range` calls in flight at once.
    pub worker_count: usize,
    /// Maximum attempts per node download before the task is marked failed.
    /// A hash mismatch never retries regardless of this value — the bytes
    /// that arrived are definitively wrong, trying again on the same origin
    /// won't change that.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Multiplier applied to the backoff after each failed attempt.
    pub backoff_factor: u32,
    /// Pending-task FIFO capacity.
    pub queue_capacity: usize,
    /// Completed-task history ring capacity.
    pub history_capacity: usize,
    /// Which strategy drives `ensure_range`'s scheduling decisions.
    pub scheduler: SchedulerChoice,
}

impl Default for PainterConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_factor: 2,
            queue_capacity: mlf_queue::DEFAULT_CAPACITY,
            history_capacity: mlf_queue::DEFAULT_HISTORY_CAPACITY,
            scheduler: SchedulerChoice::Balanced,
        }
    }
}
