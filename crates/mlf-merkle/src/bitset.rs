//! Persistent validity bitset: one bit per chunk, one critical section per
//! mutation, and an atomic cardinality cache so completeness checks never
//! scan the buffer.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use mlf_core::{Error, Result};

/// One bit per chunk: `1` means the chunk's bytes have been fetched,
/// hash-verified, and durably saved.
pub(crate) struct Bitset {
    bits: Mutex<Vec<u8>>,
    valid_count: AtomicU32,
    leaf_count: u32,
}

impl Bitset {
    /// Byte length of the bitset region for `leaf_count` chunks.
    #[must_use]
    pub(crate) fn byte_len(leaf_count: u32) -> usize {
        (leaf_count as usize).div_ceil(8)
    }

    /// A fresh, all-invalid bitset — the state a new `.mrkl` file starts in.
    #[must_use]
    pub(crate) fn zeroed(leaf_count: u32) -> Self {
        Self {
            bits: Mutex::new(vec![0u8; Self::byte_len(leaf_count)]),
            valid_count: AtomicU32::new(0),
            leaf_count,
        }
    }

    /// Restore a bitset from bytes read off disk, recomputing the
    /// cardinality cache rather than trusting a stored count.
    pub(crate) fn from_bytes(bytes: Vec<u8>, leaf_count: u32) -> Result<Self> {
        let expected = Self::byte_len(leaf_count);
        if bytes.len() != expected {
            return Err(Error::corrupt_format(format!(
                "bitset region is {} bytes, expected {expected} for {leaf_count} chunks",
                bytes.len()
            )));
        }
        let valid_count = (0..leaf_count)
            .filter(|&i| bytes[(i / 8) as usize] & (1 << (i % 8)) != 0)
            .count() as u32;

        Ok(Self {
            bits: Mutex::new(bytes),
            valid_count: AtomicU32::new(valid_count),
            leaf_count,
        })
    }

    /// `true` if `chunk_index` has been verified and saved.
    #[must_use]
    pub(crate) fn is_valid(&self, chunk_index: u32) -> bool {
        if chunk_index >= self.leaf_count {
            return false;
        }
        let bits = self.bits.lock();
        bits[(chunk_index / 8) as usize] & (1 << (chunk_index % 8)) != 0
    }

    /// Number of chunks currently marked valid.
    #[must_use]
    pub(crate) fn valid_count(&self) -> u32 {
        self.valid_count.load(Ordering::Acquire)
    }

    /// `true` once every chunk has been marked valid.
    #[must_use]
    pub(crate) fn is_complete(&self) -> bool {
        self.valid_count() == self.leaf_count
    }

    /// Snapshot the current bytes, for the initial file write.
    #[must_use]
    pub(crate) fn snapshot(&self) -> Vec<u8> {
        self.bits.lock().clone()
    }

    /// Mark `chunk_index` valid. Idempotent: returns `Ok(false)` without
    /// calling `flush` if the bit was already set. Otherwise sets the bit,
    /// runs `flush` with the whole bitset's bytes while still holding the
    /// lock, and only then publishes the new cardinality — so a reader who
    /// observes an incremented count is guaranteed the corresponding bytes
    /// are already durable.
    pub(crate) fn set_valid_and_flush<F>(&self, chunk_index: u32, flush: F) -> Result<bool>
    where
        F: FnOnce(&[u8]) -> Result<()>,
    {
        if chunk_index >= self.leaf_count {
            return Err(Error::invalid_argument(format!(
                "chunk index {chunk_index} out of range [0, {})",
                self.leaf_count
            )));
        }

        let mut bits = self.bits.lock();
        let byte = (chunk_index / 8) as usize;
        let mask = 1u8 << (chunk_index % 8);
        if bits[byte] & mask != 0 {
            return Ok(false);
        }
        bits[byte] |= mask;
        if let Err(e) = flush(&bits) {
            bits[byte] &= !mask;
            return Err(e);
        }
        self.valid_count.fetch_add(1, Ordering::AcqRel);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_and_fills_in() {
        let b = Bitset::zeroed(10);
        assert!(!b.is_complete());
        for i in 0..10 {
            assert!(b.set_valid_and_flush(i, |_| Ok(())).unwrap());
        }
        assert!(b.is_complete());
        assert_eq!(b.valid_count(), 10);
    }

    #[test]
    fn setting_twice_is_idempotent() {
        let b = Bitset::zeroed(4);
        assert!(b.set_valid_and_flush(1, |_| Ok(())).unwrap());
        assert!(!b.set_valid_and_flush(1, |_| Ok(())).unwrap());
        assert_eq!(b.valid_count(), 1);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let b = Bitset::zeroed(4);
        assert!(b.set_valid_and_flush(4, |_| Ok(())).is_err());
    }

    #[test]
    fn flush_failure_leaves_bit_unset() {
        let b = Bitset::zeroed(4);
        let err = b.set_valid_and_flush(0, |_| Err(Error::invalid_argument("disk full")));
        assert!(err.is_err());
        assert!(!b.is_valid(0));
        assert_eq!(b.valid_count(), 0);
    }

    #[test]
    fn round_trips_through_bytes() {
        let b = Bitset::zeroed(9);
        b.set_valid_and_flush(0, |_| Ok(())).unwrap();
        b.set_valid_and_flush(8, |_| Ok(())).unwrap();
        let bytes = b.snapshot();
        let restored = Bitset::from_bytes(bytes, 9).unwrap();
        assert_eq!(restored.valid_count(), 2);
        assert!(restored.is_valid(0));
        assert!(restored.is_valid(8));
        assert!(!restored.is_valid(1));
    }
}
