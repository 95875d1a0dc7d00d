//! SHA-256 leaf and parent hashing, and bottom-up tree construction.
//!
//! Node indices follow `Shape`'s flat binary-heap layout: node `0` is the
//! root, node `i`'s children are `2*i+1` and `2*i+2`, and leaves occupy
//! `[shape.offset(), shape.offset() + shape.cap_leaf())`. Filling indices in
//! descending order always computes a node's children before the node
//! itself, so no separate level-by-level pass is needed.

use mlf_core::Shape;
use sha2::{Digest, Sha256};

/// Hash slot for padding leaves: indices beyond `shape.leaf_count()` that
/// exist only so `cap_leaf` is a power of two. Written as 32 zero bytes on
/// disk, matching the source format, so they participate in parent hashing
/// with no special casing elsewhere in the tree.
#[must_use]
pub fn padding_leaf_hash() -> [u8; 32] {
    [0u8; 32]
}

/// Hash of one chunk's raw bytes.
#[inline]
#[must_use]
pub fn leaf_hash(chunk: &[u8]) -> [u8; 32] {
    Sha256::digest(chunk).into()
}

/// Hash of an internal node from its two children, left then right.
#[inline]
#[must_use]
pub fn parent_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(left);
    h.update(right);
    h.finalize().into()
}

/// Build a flat `node_count`-length hash array for `shape`, calling
/// `chunk_at(i)` once for each real chunk `i < shape.leaf_count()`.
///
/// `chunk_at` is expected to return exactly the bytes of that chunk; callers
/// reading from disk or network should slice to `shape.actual_chunk_size(i)`.
pub fn build_hashes<E>(
    shape: &Shape,
    mut chunk_at: impl FnMut(u32) -> Result<Vec<u8>, E>,
) -> Result<Vec<[u8; 32]>, E> {
    let node_count = shape.node_count() as usize;
    let offset = shape.offset() as usize;
    let cap_leaf = shape.cap_leaf() as usize;
    let leaf_count = shape.leaf_count();

    let mut hashes = vec![[0u8; 32]; node_count];
    for slot in 0..cap_leaf {
        let node = offset + slot;
        #[allow(clippy::cast_possible_truncation)]
        let slot_u32 = slot as u32;
        hashes[node] = if slot_u32 < leaf_count {
            leaf_hash(&chunk_at(slot_u32)?)
        } else {
            padding_leaf_hash()
        };
    }

    for i in (0..offset).rev() {
        hashes[i] = parent_hash(&hashes[2 * i + 1], &hashes[2 * i + 2]);
    }

    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_tree_root_is_its_leaf_hash() {
        let shape = Shape::new(10);
        let hashes = build_hashes::<std::convert::Infallible>(&shape, |i| {
            assert_eq!(i, 0);
            Ok(vec![7u8; 10])
        })
        .unwrap();
        assert_eq!(hashes[0], leaf_hash(&[7u8; 10]));
    }

    #[test]
    fn two_leaf_tree_root_is_parent_of_both() {
        let shape = Shape::new(1_572_864);
        assert_eq!(shape.leaf_count(), 2);
        let chunks = [vec![1u8; 1_048_576], vec![2u8; 524_288]];
        let hashes =
            build_hashes::<std::convert::Infallible>(&shape, |i| Ok(chunks[i as usize].clone()))
                .unwrap();
        let l0 = leaf_hash(&chunks[0]);
        let l1 = leaf_hash(&chunks[1]);
        assert_eq!(hashes[0], parent_hash(&l0, &l1));
    }

    #[test]
    fn padded_leaf_is_all_zero_bytes() {
        // leaf_count=3, cap_leaf=4: node offset+3 is pure padding.
        let shape = Shape::new(2_621_440);
        assert_eq!(shape.leaf_count(), 3);
        assert_eq!(shape.cap_leaf(), 4);
        let hashes = build_hashes::<std::convert::Infallible>(&shape, |_| Ok(vec![0u8; 1])).unwrap();
        let padding_node = shape.offset() as usize + 3;
        assert_eq!(hashes[padding_node], padding_leaf_hash());
        assert_eq!(hashes[padding_node], [0u8; 32]);
    }

    #[test]
    fn propagates_chunk_read_errors() {
        let shape = Shape::new(8 * (1 << 20));
        let result = build_hashes(&shape, |_| Err("boom"));
        assert_eq!(result.unwrap_err(), "boom");
    }
}
