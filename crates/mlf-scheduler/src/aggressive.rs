//! Climbs further than [`crate::DefaultScheduler`] and adds speculative
//! look-ahead beyond the caller's required range. Trades bandwidth for fewer
//! round trips and a warmer cache ahead of the read head.

use std::collections::BTreeSet;

use mlf_core::{Reason, Result, SchedulingDecision, Shape, ValidityView};

use crate::support::{climb, contiguous_runs, leaf_decision, node_decision, prefetch_decision};
use crate::Scheduler;

/// Fraction of a candidate node's total bytes the aggressive strategy is
/// willing to spend on chunks the caller didn't ask for, verified or not.
const WASTE_BUDGET: f64 = 0.75;

/// Climbs aggressively and prefetches `lookahead_chunks` chunks past the end
/// of the caller's required range.
#[derive(Clone, Copy, Debug)]
pub struct AggressiveScheduler {
    /// Number of chunks beyond the required range to speculatively prefetch.
    pub lookahead_chunks: u32,
}

impl Default for AggressiveScheduler {
    fn default() -> Self {
        Self { lookahead_chunks: 4 }
    }
}

impl Scheduler for AggressiveScheduler {
    fn select_optimal_nodes(
        &self,
        required_chunks: &[u32],
        shape: &Shape,
        state: &dyn ValidityView,
    ) -> Result<Vec<SchedulingDecision>> {
        if required_chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut sorted: Vec<u32> = required_chunks.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let required_set: BTreeSet<u32> = sorted.iter().copied().collect();

        let mut decisions = Vec::new();
        let mut priority = 0u32;
        for (lo, hi) in contiguous_runs(&sorted) {
            let mut pos = lo;
            while pos < hi {
                let (node, covered_lo, covered_hi) =
                    climb(shape, pos, hi, &required_set, state, WASTE_BUDGET, true)?;
                if covered_hi - covered_lo == 1 {
                    decisions.push(leaf_decision(shape, pos, sorted.len() == 1, priority)?);
                } else {
                    let reason = if covered_hi <= hi {
                        Reason::EfficientCoverage
                    } else {
                        Reason::Consolidation
                    };
                    decisions.push(node_decision(
                        shape,
                        node,
                        (covered_lo, covered_hi),
                        &required_set,
                        reason,
                        priority,
                    )?);
                }
                priority += 1;
                pos = covered_hi.max(pos + 1);
            }
        }

        // Required-serving decisions all carry lower priority numbers than
        // prefetch, so a consumer that sorts by priority always drains the
        // caller's actual request before spending bandwidth on look-ahead.
        let last_required = sorted[sorted.len() - 1];
        let prefetch_hi = (last_required + 1 + self.lookahead_chunks).min(shape.leaf_count());
        for chunk in (last_required + 1)..prefetch_hi {
            if state.is_valid(chunk) {
                continue;
            }
            decisions.push(prefetch_decision(shape, chunk, priority)?);
            priority += 1;
        }

        Ok(decisions)
    }
}
