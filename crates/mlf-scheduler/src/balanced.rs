//! Coalesces contiguous runs of missing chunks into one internal-node
//! download when the waste it would pull in alongside them — already-valid
//! neighbor chunks — stays within a small budget.

use std::collections::BTreeSet;

use mlf_core::{Reason, Result, SchedulingDecision, Shape, ValidityView};

use crate::support::{climb, contiguous_runs, leaf_decision, node_decision};
use crate::Scheduler;

/// Fraction of a candidate node's total bytes that may be spent on chunks
/// the caller did not ask for before the balanced strategy gives up
/// climbing and falls back to finer-grained downloads.
const WASTE_BUDGET: f64 = 0.25;

/// The balanced, general-purpose strategy: efficient for both single
/// chunks and large contiguous reads.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultScheduler;

impl Scheduler for DefaultScheduler {
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
                    climb(shape, pos, hi, &required_set, state, WASTE_BUDGET, false)?;
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
        Ok(decisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllInvalid;
    impl ValidityView for AllInvalid {
        fn is_valid(&self, _chunk_index: u32) -> bool {
            false
        }
    }

    struct ValidOnly(BTreeSet<u32>);
    impl ValidityView for ValidOnly {
        fn is_valid(&self, chunk_index: u32) -> bool {
            self.0.contains(&chunk_index)
        }
    }

    #[test]
    fn coalesces_a_full_power_of_two_run_into_one_node() {
        // leafCount=16, request chunks 0..4: an exact subtree, zero waste.
        let shape = Shape::new(16 * (1 << 20));
        let decisions = DefaultScheduler
            .select_optimal_nodes(&[0, 1, 2, 3], &shape, &AllInvalid)
            .unwrap();
        assert_eq!(decisions.len(), 1);
        let d = &decisions[0];
        assert_eq!(d.covered_chunks, vec![0, 1, 2, 3]);
        assert_eq!(d.required_chunks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn satisfies_completeness_and_no_redundancy() {
        let shape = Shape::new(16 * (1 << 20));
        let required = vec![2, 3, 4, 5];
        let decisions = DefaultScheduler
            .select_optimal_nodes(&required, &shape, &AllInvalid)
            .unwrap();

        let mut covered_required = BTreeSet::new();
        for d in &decisions {
            for c in &d.required_chunks {
                assert!(
                    covered_required.insert(*c),
                    "chunk {c} covered by more than one decision"
                );
            }
        }
        for c in &required {
            assert!(covered_required.contains(c));
        }
    }

    #[test]
    fn single_isolated_chunk_falls_back_to_a_leaf() {
        let shape = Shape::new(16 * (1 << 20));
        let decisions = DefaultScheduler
            .select_optimal_nodes(&[9], &shape, &AllInvalid)
            .unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].covered_chunks, vec![9]);
    }

    #[test]
    fn does_not_climb_past_waste_budget_into_unverified_neighbors() {
        // Asking for chunk 0 alone in a 4-leaf tree: the sibling subtree
        // (chunks 1..4) is both large and entirely unverified, so climbing
        // to the root would blow the waste budget and must stop at the leaf.
        let shape = Shape::new(4 * (1 << 20));
        let decisions = DefaultScheduler
            .select_optimal_nodes(&[0], &shape, &AllInvalid)
            .unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].covered_chunks, vec![0]);
    }

    #[test]
    fn climbs_through_a_single_already_valid_neighbor_at_the_budget_boundary() {
        // 16-leaf tree, chunks 0..3 required; chunk 3 already valid. The
        // 4-leaf node spanning [0,4) wastes exactly 1 of its 4 chunks on an
        // already-valid re-download: precisely the 25% budget boundary.
        let shape = Shape::new(16 * (1 << 20));
        let valid: BTreeSet<u32> = [3].into_iter().collect();
        let decisions = DefaultScheduler
            .select_optimal_nodes(&[0, 1, 2], &shape, &ValidOnly(valid))
            .unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].covered_chunks, vec![0, 1, 2, 3]);
        assert_eq!(decisions[0].required_chunks, vec![0, 1, 2]);
    }
}
