//! Helpers shared by every concrete strategy: turning a byte range into a
//! required-chunk set, turning a node index into a [`NodeDownloadTask`], and
//! grouping chunk indices into contiguous runs for coalescing.

use std::collections::BTreeSet;

use mlf_core::{NodeDownloadTask, Reason, Result, SchedulingDecision, Shape, ValidityView};

/// Chunks in `[offset, offset+length)` that are not yet valid, ascending.
#[must_use]
pub(crate) fn missing_chunks_in_range(
    offset: u64,
    length: u64,
    shape: &Shape,
    state: &dyn ValidityView,
) -> Vec<u32> {
    if length == 0 {
        return Vec::new();
    }
    let start = shape.chunk_index_for_position(offset);
    let last_byte = offset + length - 1;
    let end = shape.chunk_index_for_position(last_byte.min(shape.total_content_size().saturating_sub(1)));
    (start..=end).filter(|&c| !state.is_valid(c)).collect()
}

/// Build a [`NodeDownloadTask`] for `node_index` (SC4: node legality).
pub(crate) fn task_for_node(shape: &Shape, node_index: u32) -> Result<NodeDownloadTask> {
    let (byte_offset, byte_end) = shape.byte_range_for_node(node_index)?;
    let leaf_range = shape.chunks_for_node(node_index)?;
    Ok(NodeDownloadTask {
        node_index,
        byte_offset,
        byte_size: byte_end - byte_offset,
        is_leaf: shape.is_leaf(node_index),
        leaf_range,
    })
}

/// A single-leaf decision for `chunk_index`; `EXACT_MATCH` when it is the
/// only chunk being requested this call, `MINIMAL_DOWNLOAD` otherwise.
pub(crate) fn leaf_decision(
    shape: &Shape,
    chunk_index: u32,
    sole_chunk: bool,
    priority: u32,
) -> Result<SchedulingDecision> {
    let node_index = shape.chunk_index_to_leaf_node(chunk_index)?;
    let estimated_bytes = shape.actual_chunk_size(chunk_index)?;
    let reason = if sole_chunk { Reason::ExactMatch } else { Reason::MinimalDownload };
    Ok(SchedulingDecision {
        node_index,
        reason,
        priority,
        estimated_bytes,
        required_chunks: vec![chunk_index],
        covered_chunks: vec![chunk_index],
        explanation: format!("leaf download for chunk {chunk_index}"),
    })
}

/// Split a sorted, deduplicated chunk-index slice into maximal contiguous
/// runs `[lo, hi)`.
#[must_use]
pub(crate) fn contiguous_runs(sorted_chunks: &[u32]) -> Vec<(u32, u32)> {
    let mut runs = Vec::new();
    let mut iter = sorted_chunks.iter().copied();
    let Some(mut lo) = iter.next() else { return runs };
    let mut hi = lo + 1;
    for c in iter {
        if c == hi {
            hi += 1;
        } else {
            runs.push((lo, hi));
            lo = c;
            hi = c + 1;
        }
    }
    runs.push((lo, hi));
    runs
}

/// Climb from the leaf of `start` toward the root for as long as: the
/// candidate ancestor's left edge stays at `start` (so climbing never
/// re-covers chunks to the left, which would violate SC2 against an earlier
/// decision in the same run), every chunk the ancestor adds beyond `[start,
/// run_hi)` is not present in `required_set` (so it is never a chunk some
/// other decision still needs), and the cumulative wasted bytes stay within
/// `waste_budget_fraction` of the ancestor's total size.
///
/// `allow_unverified_waste` controls whether an extra chunk that is neither
/// required nor already valid may still be folded in (counted as waste, the
/// same as an already-valid one) — the balanced strategy forbids this
/// (unverified bytes are never worth re-fetching speculatively), the
/// aggressive strategy allows it so long as the budget holds.
///
/// Returns the accepted node index and the chunk range it covers.
pub(crate) fn climb(
    shape: &Shape,
    start: u32,
    run_hi: u32,
    required_set: &BTreeSet<u32>,
    state: &dyn ValidityView,
    waste_budget_fraction: f64,
    allow_unverified_waste: bool,
) -> Result<(u32, u32, u32)> {
    let mut node = shape.chunk_index_to_leaf_node(start)?;
    let mut range = shape.chunks_for_node(node)?;
    debug_assert_eq!(range, (start, start + 1));

    loop {
        if node == 0 {
            break;
        }
        let parent = (node - 1) / 2;
        let prange = shape.chunks_for_node(parent)?;
        if prange.0 != range.0 {
            break;
        }

        let extra_lo = range.1;
        let extra_hi = prange.1;
        let mut waste_bytes = 0u64;
        let mut acceptable = true;
        for c in extra_lo..extra_hi {
            if c < run_hi {
                continue;
            }
            if required_set.contains(&c) {
                acceptable = false;
                break;
            }
            if !state.is_valid(c) && !allow_unverified_waste {
                acceptable = false;
                break;
            }
            waste_bytes += shape.actual_chunk_size(c)?;
        }
        if !acceptable {
            break;
        }

        let (pstart, pend) = shape.byte_range_for_node(parent)?;
        let budget = (pend - pstart) as f64 * waste_budget_fraction;
        if waste_bytes as f64 > budget {
            break;
        }

        node = parent;
        range = prange;
    }

    Ok((node, range.0, range.1))
}

/// Build a decision for an (possibly internal) node given the chunk range
/// it covers; `required_chunks` is the intersection of that range with the
/// caller's overall required set.
pub(crate) fn node_decision(
    shape: &Shape,
    node_index: u32,
    covered_range: (u32, u32),
    required_set: &BTreeSet<u32>,
    reason: Reason,
    priority: u32,
) -> Result<SchedulingDecision> {
    let (byte_start, byte_end) = shape.byte_range_for_node(node_index)?;
    let covered_chunks: Vec<u32> = (covered_range.0..covered_range.1).collect();
    let required_chunks: Vec<u32> = covered_chunks
        .iter()
        .copied()
        .filter(|c| required_set.contains(c))
        .collect();
    Ok(SchedulingDecision {
        node_index,
        reason,
        priority,
        estimated_bytes: byte_end - byte_start,
        required_chunks,
        covered_chunks,
        explanation: format!(
            "node {node_index} covers chunks [{}, {})",
            covered_range.0, covered_range.1
        ),
    })
}

/// A pure look-ahead decision for `chunk_index`: no required chunks, lowest
/// priority, `Reason::Prefetch`.
pub(crate) fn prefetch_decision(
    shape: &Shape,
    chunk_index: u32,
    priority: u32,
) -> Result<SchedulingDecision> {
    let node_index = shape.chunk_index_to_leaf_node(chunk_index)?;
    let estimated_bytes = shape.actual_chunk_size(chunk_index)?;
    Ok(SchedulingDecision {
        node_index,
        reason: Reason::Prefetch,
        priority,
        estimated_bytes,
        required_chunks: Vec::new(),
        covered_chunks: vec![chunk_index],
        explanation: format!("speculative prefetch of chunk {chunk_index}"),
    })
}
