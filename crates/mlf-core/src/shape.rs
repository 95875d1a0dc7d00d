//! Pure chunk/node geometry over a fixed content length.
//!
//! `Shape` is the single source of truth every other component consults
//! before turning a byte position into a chunk index, or a chunk index into
//! a node index in the flat Merkle array (invariant I4). It has no side
//! effects and never touches I/O.

use crate::error::{Error, Result};

/// Smallest chunk size the tree will pick, in bytes.
pub const MIN_CHUNK_SIZE: u64 = 1 << 20; // 1 MiB
/// Largest chunk size the tree will pick, in bytes.
pub const MAX_CHUNK_SIZE: u64 = 64 << 20; // 64 MiB
/// Floor used when the whole content is smaller than `MIN_CHUNK_SIZE`.
pub const MIN_SMALL_CHUNK_SIZE: u64 = 64;
/// Upper bound on the number of leaves a tree may have.
pub const MAX_LEAVES: u64 = 4096;

/// Immutable geometry of a Merkle tree over a content range of known length.
///
/// All fields are derived deterministically from `total_content_size`; two
/// `Shape`s built from the same size are always equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shape {
    chunk_size: u64,
    total_content_size: u64,
    leaf_count: u32,
    cap_leaf: u32,
    node_count: u32,
    offset: u32,
    internal_node_count: u32,
}

impl Shape {
    /// Derive the geometry for a content range of `total_content_size` bytes.
    #[must_use]
    pub fn new(total_content_size: u64) -> Self {
        let chunk_size = choose_chunk_size(total_content_size);
        let leaf_count = leaf_count_for(total_content_size, chunk_size);
        let cap_leaf = next_pow2(leaf_count.max(1));
        let node_count = 2 * cap_leaf - 1;
        let offset = cap_leaf - 1;
        let internal_node_count = node_count - leaf_count;

        Self {
            chunk_size,
            total_content_size,
            leaf_count,
            cap_leaf,
            node_count,
            offset,
            internal_node_count,
        }
    }

    /// Reconstruct a `Shape` from scalars already validated by the footer
    /// codec, without recomputing chunk-size selection. Used by
    /// `Footer::decode` so a loaded file's geometry always matches what was
    /// persisted even if the selection policy changes in a later version.
    #[must_use]
    pub fn from_scalars(
        chunk_size: u64,
        total_content_size: u64,
        leaf_count: u32,
        cap_leaf: u32,
        node_count: u32,
        offset: u32,
        internal_node_count: u32,
    ) -> Self {
        Self {
            chunk_size,
            total_content_size,
            leaf_count,
            cap_leaf,
            node_count,
            offset,
            internal_node_count,
        }
    }

    /// Chunk size in bytes (power of two).
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Total logical content length in bytes.
    #[inline]
    #[must_use]
    pub fn total_content_size(&self) -> u64 {
        self.total_content_size
    }

    /// Number of real (non-padding) leaves.
    #[inline]
    #[must_use]
    pub fn leaf_count(&self) -> u32 {
        self.leaf_count
    }

    /// Padded leaf count: next power of two `>= leaf_count`.
    #[inline]
    #[must_use]
    pub fn cap_leaf(&self) -> u32 {
        self.cap_leaf
    }

    /// Total node count in the flat array (`2*cap_leaf - 1`).
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Index of the first leaf slot in the flat node array.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of internal (non-leaf) node slots.
    #[inline]
    #[must_use]
    pub fn internal_node_count(&self) -> u32 {
        self.internal_node_count
    }

    fn check_chunk_index(&self, chunk_index: u32) -> Result<()> {
        if chunk_index >= self.leaf_count {
            return Err(Error::invalid_argument(format!(
                "chunk index {chunk_index} out of range [0, {})",
                self.leaf_count
            )));
        }
        Ok(())
    }

    fn check_node_index(&self, node_index: u32) -> Result<()> {
        if node_index >= self.node_count {
            return Err(Error::invalid_argument(format!(
                "node index {node_index} out of range [0, {})",
                self.node_count
            )));
        }
        Ok(())
    }

    /// Byte range `[start, end)` covered by chunk `chunk_index`.
    pub fn chunk_boundary(&self, chunk_index: u32) -> Result<(u64, u64)> {
        self.check_chunk_index(chunk_index)?;
        let start = u64::from(chunk_index) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_content_size);
        Ok((start, end))
    }

    /// Actual byte length of chunk `chunk_index` (short for the last chunk).
    pub fn actual_chunk_size(&self, chunk_index: u32) -> Result<u64> {
        let (start, end) = self.chunk_boundary(chunk_index)?;
        Ok(end - start)
    }

    /// Chunk index containing content position `position`, clamped to the
    /// last valid chunk when `position == total_content_size` (so an
    /// exclusive end-of-range lookup never panics).
    #[must_use]
    pub fn chunk_index_for_position(&self, position: u64) -> u32 {
        if self.leaf_count == 0 {
            return 0;
        }
        let idx = position / self.chunk_size;
        idx.min(u64::from(self.leaf_count - 1)) as u32
    }

    /// Convert a leaf-node index (in `[offset, offset+cap_leaf)`) to a chunk
    /// index (in `[0, cap_leaf)`; the caller is responsible for checking the
    /// result against `leaf_count` if padding matters.
    pub fn leaf_node_to_chunk_index(&self, node_index: u32) -> Result<u32> {
        self.check_node_index(node_index)?;
        if node_index < self.offset {
            return Err(Error::invalid_argument(format!(
                "node {node_index} is not a leaf (offset={})",
                self.offset
            )));
        }
        Ok(node_index - self.offset)
    }

    /// Convert a chunk index to its leaf-node index in the flat array.
    pub fn chunk_index_to_leaf_node(&self, chunk_index: u32) -> Result<u32> {
        self.check_chunk_index(chunk_index)?;
        Ok(self.offset + chunk_index)
    }

    /// Tree level of `node_index`, root = level 0.
    fn level_of(&self, node_index: u32) -> u32 {
        // cap_leaf is a power of two; levels run 0..=log2(cap_leaf).
        let total_levels = self.cap_leaf.trailing_zeros();
        // Level boundaries: level L starts at node index 2^L - 1.
        let mut level = 0u32;
        let mut start = 0u32;
        while level < total_levels {
            let next_start = 2 * start + 1;
            if node_index < next_start {
                break;
            }
            start = next_start;
            level += 1;
        }
        level
    }

    /// Half-open chunk range `[lo, hi)` materialized by `node_index`,
    /// clamped to `[0, leaf_count)`.
    pub fn chunks_for_node(&self, node_index: u32) -> Result<(u32, u32)> {
        self.check_node_index(node_index)?;

        if node_index >= self.offset {
            // Leaf node: single chunk slot (may be a padding slot).
            let k = node_index - self.offset;
            let hi = (k + 1).min(self.leaf_count);
            let lo = k.min(self.leaf_count);
            return Ok((lo, hi));
        }

        let level = self.level_of(node_index);
        let level_start = (1u32 << level) - 1;
        let pos_in_level = node_index - level_start;
        let leaves_per_node = self.cap_leaf >> level;
        let lo = pos_in_level * leaves_per_node;
        let hi = (lo + leaves_per_node).min(self.leaf_count);
        let lo = lo.min(self.leaf_count);
        Ok((lo, hi))
    }

    /// Alias for [`Shape::chunks_for_node`] matching spec naming
    /// (`getLeafRangeForNode`).
    pub fn leaf_range_for_node(&self, node_index: u32) -> Result<(u32, u32)> {
        self.chunks_for_node(node_index)
    }

    /// Byte range `[start, end)` materialized by `node_index`.
    pub fn byte_range_for_node(&self, node_index: u32) -> Result<(u64, u64)> {
        let (lo, hi) = self.chunks_for_node(node_index)?;
        if lo >= hi {
            // Pure padding node: empty range anchored at the nominal offset.
            let start = u64::from(lo) * self.chunk_size;
            return Ok((start, start));
        }
        let (start, _) = self.chunk_boundary(lo)?;
        let (_, end) = self.chunk_boundary(hi - 1)?;
        Ok((start, end))
    }

    /// All node indices at tree level `level` (root = level 0).
    #[must_use]
    pub fn internal_nodes_at_level(&self, level: u32) -> Vec<u32> {
        let total_levels = self.cap_leaf.trailing_zeros();
        if level > total_levels {
            return Vec::new();
        }
        let level_start = (1u32 << level) - 1;
        let count_at_level = 1u32 << level;
        (level_start..level_start + count_at_level).collect()
    }

    /// `true` if `node_index` is a leaf slot.
    #[must_use]
    pub fn is_leaf(&self, node_index: u32) -> bool {
        node_index >= self.offset
    }
}

fn next_pow2(x: u32) -> u32 {
    if x <= 1 {
        return 1;
    }
    x.next_power_of_two()
}

fn leaf_count_for(total_content_size: u64, chunk_size: u64) -> u32 {
    if total_content_size == 0 {
        return 1;
    }
    let n = total_content_size.div_ceil(chunk_size);
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn choose_chunk_size(total_content_size: u64) -> u64 {
    if total_content_size < MIN_CHUNK_SIZE {
        let mut size = MIN_SMALL_CHUNK_SIZE;
        while size < total_content_size.max(1) {
            size <<= 1;
        }
        return size.max(MIN_SMALL_CHUNK_SIZE);
    }

    let mut size = MIN_CHUNK_SIZE;
    while size < MAX_CHUNK_SIZE && total_content_size.div_ceil(size) > MAX_LEAVES {
        size <<= 1;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_chunk_file_last_short() {
        let shape = Shape::new(1_572_864);
        assert_eq!(shape.chunk_size(), 1_048_576);
        assert_eq!(shape.leaf_count(), 2);
        assert_eq!(shape.cap_leaf(), 2);
        assert_eq!(shape.node_count(), 3);
        assert_eq!(shape.offset(), 1);

        assert_eq!(shape.chunk_boundary(0).unwrap(), (0, 1_048_576));
        assert_eq!(shape.chunk_boundary(1).unwrap(), (1_048_576, 1_572_864));
        assert_eq!(shape.actual_chunk_size(1).unwrap(), 524_288);
    }

    #[test]
    fn boundary_prebuffer_shape_has_one_padded_leaf() {
        let shape = Shape::new(2_621_440);
        assert_eq!(shape.chunk_size(), 1_048_576);
        assert_eq!(shape.leaf_count(), 3);
        assert_eq!(shape.cap_leaf(), 4);
        assert_eq!(shape.node_count(), 7);
        assert_eq!(shape.offset(), 3);
    }

    #[test]
    fn small_content_uses_floor_power_of_two() {
        let shape = Shape::new(10);
        assert_eq!(shape.chunk_size(), MIN_SMALL_CHUNK_SIZE);
        assert_eq!(shape.leaf_count(), 1);
    }

    #[test]
    fn empty_content_has_single_empty_leaf() {
        let shape = Shape::new(0);
        assert_eq!(shape.leaf_count(), 1);
        assert_eq!(shape.actual_chunk_size(0).unwrap(), 0);
    }

    #[test]
    fn chunk_index_for_position_clamps_at_eof() {
        let shape = Shape::new(1_572_864);
        assert_eq!(shape.chunk_index_for_position(0), 0);
        assert_eq!(shape.chunk_index_for_position(1_048_576), 1);
        assert_eq!(shape.chunk_index_for_position(1_572_864), 1);
    }

    #[test]
    fn chunks_for_node_covers_whole_range_and_out_of_range_errors() {
        let shape = Shape::new(8 * (1 << 20));
        assert_eq!(shape.leaf_count(), 8);
        let (lo, hi) = shape.chunks_for_node(0).unwrap();
        assert_eq!((lo, hi), (0, 8));
        assert!(shape.chunks_for_node(shape.node_count()).is_err());
        assert!(shape.chunk_boundary(shape.leaf_count()).is_err());
    }

    #[test]
    fn leaf_node_round_trip() {
        let shape = Shape::new(4 * (1 << 20));
        for k in 0..shape.leaf_count() {
            let node = shape.chunk_index_to_leaf_node(k).unwrap();
            assert_eq!(shape.leaf_node_to_chunk_index(node).unwrap(), k);
            assert!(shape.is_leaf(node));
        }
    }

    proptest::proptest! {
        #[test]
        fn leaf_count_never_exceeds_cap(size in 0u64..(200u64 << 20)) {
            let shape = Shape::new(size);
            prop_assert!(shape.leaf_count() <= shape.cap_leaf());
            prop_assert!(shape.cap_leaf().is_power_of_two());
            prop_assert_eq!(shape.node_count(), 2 * shape.cap_leaf() - 1);
        }

        #[test]
        fn chunks_for_node_union_covers_all_leaves(size in 1u64..(32u64 << 20)) {
            let shape = Shape::new(size);
            let mut covered = vec![false; shape.leaf_count() as usize];
            for node in shape.offset()..shape.offset() + shape.leaf_count() {
                let (lo, hi) = shape.chunks_for_node(node).unwrap();
                for c in lo..hi {
                    covered[c as usize] = true;
                }
            }
            prop_assert!(covered.into_iter().all(|b| b));
        }
    }
}
