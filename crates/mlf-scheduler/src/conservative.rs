//! One decision per missing chunk, leaf nodes only — the smallest possible
//! download, used when bandwidth is precious or the caller wants minimal
//! read amplification.

use mlf_core::{Result, SchedulingDecision, Shape, ValidityView};

use crate::support::leaf_decision;
use crate::Scheduler;

/// Downloads exactly the leaves a caller asked for, nothing more.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConservativeScheduler;

impl Scheduler for ConservativeScheduler {
    fn select_optimal_nodes(
        &self,
        required_chunks: &[u32],
        shape: &Shape,
        _state: &dyn ValidityView,
    ) -> Result<Vec<SchedulingDecision>> {
        let sole = required_chunks.len() == 1;
        required_chunks
            .iter()
            .enumerate()
            .map(|(priority, &chunk)| leaf_decision(shape, chunk, sole, priority as u32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlf_core::Reason;

    struct AllInvalid;
    impl ValidityView for AllInvalid {
        fn is_valid(&self, _chunk_index: u32) -> bool {
            false
        }
    }

    #[test]
    fn one_leaf_decision_per_required_chunk() {
        let shape = Shape::new(16 * (1 << 20));
        assert_eq!(shape.leaf_count(), 16);
        let decisions = ConservativeScheduler
            .select_optimal_nodes(&[2, 3, 4, 5], &shape, &AllInvalid)
            .unwrap();
        assert_eq!(decisions.len(), 4);
        for d in &decisions {
            assert_eq!(d.covered_chunks.len(), 1);
            assert!(shape.is_leaf(d.node_index));
        }
    }

    #[test]
    fn single_chunk_uses_exact_match() {
        let shape = Shape::new(16 * (1 << 20));
        let decisions = ConservativeScheduler
            .select_optimal_nodes(&[7], &shape, &AllInvalid)
            .unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].reason, Reason::ExactMatch);
    }
}
