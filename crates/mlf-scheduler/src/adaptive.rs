//! Self-tuning composite: delegates to one of the three fixed strategies
//! based on an aggressiveness level it adjusts from the efficiency and
//! coverage of its own recent decisions.
//!
//! There is no feedback channel from the painter back into the scheduler
//! trait, so "how well recent decisions performed" is scoped to what
//! [`mlf_core::SchedulingDecision::efficiency`] and
//! [`mlf_core::SchedulingDecision::coverage`] can tell from the decisions
//! themselves — not actual transport outcomes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use mlf_core::{Result, SchedulingDecision, Shape, ValidityView};

use crate::{AggressiveScheduler, ConservativeScheduler, DefaultScheduler, Scheduler};

/// Minimum aggressiveness level (always conservative).
const MIN_LEVEL: u8 = 1;
/// Maximum aggressiveness level (always aggressive, widest look-ahead).
const MAX_LEVEL: u8 = 5;
/// How often the level is allowed to move, so one bad call can't whipsaw it.
const ADAPT_INTERVAL: Duration = Duration::from_secs(5);
/// Rolling sample window used to compute average efficiency/coverage.
const SAMPLE_WINDOW: usize = 20;

struct Sample {
    efficiency: f64,
    coverage: f64,
}

/// Adjusts between [`ConservativeScheduler`], [`DefaultScheduler`], and
/// [`AggressiveScheduler`] as recent decisions trend toward wasteful or
/// toward under-covering.
pub struct AdaptiveScheduler {
    level: AtomicU8,
    samples: Mutex<Vec<Sample>>,
    last_adapted: Mutex<Instant>,
    conservative: ConservativeScheduler,
    balanced: DefaultScheduler,
    aggressive: AggressiveScheduler,
}

impl AdaptiveScheduler {
    /// Start at the middle (balanced) aggressiveness level.
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: AtomicU8::new(3),
            samples: Mutex::new(Vec::new()),
            last_adapted: Mutex::new(Instant::now()),
            conservative: ConservativeScheduler,
            balanced: DefaultScheduler,
            aggressive: AggressiveScheduler::default(),
        }
    }

    /// Current aggressiveness level, `1` (most conservative) to `5` (most
    /// aggressive).
    #[must_use]
    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Relaxed)
    }

    fn strategy_for(level: u8) -> u8 {
        level.clamp(MIN_LEVEL, MAX_LEVEL)
    }

    fn record(&self, decisions: &[SchedulingDecision]) {
        if decisions.is_empty() {
            return;
        }
        let efficiency = decisions.iter().map(SchedulingDecision::efficiency).sum::<f64>()
            / decisions.len() as f64;
        let coverage = decisions.iter().map(SchedulingDecision::coverage).sum::<f64>()
            / decisions.len() as f64;

        let mut samples = self.samples.lock();
        samples.push(Sample { efficiency, coverage });
        if samples.len() > SAMPLE_WINDOW {
            samples.remove(0);
        }

        let mut last_adapted = self.last_adapted.lock();
        if last_adapted.elapsed() < ADAPT_INTERVAL {
            return;
        }
        let avg_efficiency =
            samples.iter().map(|s| s.efficiency).sum::<f64>() / samples.len() as f64;
        let avg_coverage =
            samples.iter().map(|s| s.coverage).sum::<f64>() / samples.len() as f64;

        let current = self.level.load(Ordering::Relaxed);
        let next = if avg_coverage < 0.95 {
            // Under-covering: climb isn't keeping up, be more aggressive.
            current.saturating_add(1).min(MAX_LEVEL)
        } else if avg_efficiency < 0.6 {
            // Lots of wasted bytes relative to what was actually needed.
            current.saturating_sub(1).max(MIN_LEVEL)
        } else {
            current
        };
        if next != current {
            tracing::debug!(from = current, to = next, avg_efficiency, avg_coverage, "adapting scheduler aggressiveness");
            self.level.store(next, Ordering::Relaxed);
        }
        *last_adapted = Instant::now();
    }
}

impl Default for AdaptiveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for AdaptiveScheduler {
    fn select_optimal_nodes(
        &self,
        required_chunks: &[u32],
        shape: &Shape,
        state: &dyn ValidityView,
    ) -> Result<Vec<SchedulingDecision>> {
        let level = Self::strategy_for(self.level.load(Ordering::Relaxed));
        let decisions = match level {
            1..=2 => self.conservative.select_optimal_nodes(required_chunks, shape, state)?,
            3 => self.balanced.select_optimal_nodes(required_chunks, shape, state)?,
            _ => self.aggressive.select_optimal_nodes(required_chunks, shape, state)?,
        };
        self.record(&decisions);
        Ok(decisions)
    }
}
