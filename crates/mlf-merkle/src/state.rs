//! `.mrkl` files: mutable Merkle trees whose chunks become verified over
//! time.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use mlf_core::{Error, Footer, Result, Shape, FIXED_FOOTER_SIZE};

use crate::bitset::Bitset;
use crate::hashing::leaf_hash;
use crate::proof::MerkleProof;
use crate::reference::MerkleRef;
use crate::tree::{decode_hashes, encode_hashes, path_to_root, read_exact_at, write_all_at, TreeData};

/// A Merkle tree under construction: the hash region is fixed at creation
/// (invariant I3), but a persistent bitset tracks which chunks have actually
/// been fetched, hash-verified, and saved.
pub struct MerkleState {
    inner: Arc<TreeData>,
    bitset: Bitset,
    file: Mutex<File>,
    path: PathBuf,
    bitset_offset: u64,
}

impl MerkleState {
    /// Create a fresh `.mrkl` file at `path` sharing `reference`'s hash
    /// region but starting with an empty validity bitset
    /// (`createStateFromRef`).
    pub fn create_from_ref(reference: &MerkleRef, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let shared = reference.shared();
        let bitset = Bitset::zeroed(shared.shape.leaf_count());

        let mut file = File::create(&path).map_err(|e| Error::io_path(&path, e))?;
        let hash_bytes = encode_hashes(&shared.hashes);
        write_all_at(&mut file, &path, 0, &hash_bytes)?;

        let bitset_offset = hash_bytes.len() as u64;
        let bitset_bytes = bitset.snapshot();
        write_all_at(&mut file, &path, bitset_offset, &bitset_bytes)?;

        let footer = Footer::from_shape(&shared.shape, bitset_bytes.len() as u32);
        write_all_at(
            &mut file,
            &path,
            bitset_offset + bitset_bytes.len() as u64,
            &footer.encode(),
        )?;
        file.sync_data().map_err(|e| Error::io_path(&path, e))?;

        Ok(Self {
            inner: shared,
            bitset,
            file: Mutex::new(file),
            path,
            bitset_offset,
        })
    }

    /// Load an existing `.mrkl` file, restoring both the hash region and the
    /// validity bitset.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io_path(&path, e))?;
        let file_len = file.metadata().map_err(|e| Error::io_path(&path, e))?.len();

        let mut footer_buf = [0u8; FIXED_FOOTER_SIZE];
        read_exact_at(
            &mut file,
            &path,
            file_len - FIXED_FOOTER_SIZE as u64,
            &mut footer_buf,
        )?;
        let footer = Footer::decode(&footer_buf, file_len)?;
        let shape = footer.shape();

        let mut hash_bytes = vec![0u8; shape.node_count() as usize * 32];
        read_exact_at(&mut file, &path, 0, &mut hash_bytes)?;
        let hashes = decode_hashes(&hash_bytes);

        let bitset_offset = hash_bytes.len() as u64;
        let mut bitset_bytes = vec![0u8; footer.bit_set_size as usize];
        read_exact_at(&mut file, &path, bitset_offset, &mut bitset_bytes)?;
        let bitset = Bitset::from_bytes(bitset_bytes, shape.leaf_count())?;

        Ok(Self {
            inner: Arc::new(TreeData { shape, hashes }),
            bitset,
            file: Mutex::new(file),
            path,
            bitset_offset,
        })
    }

    /// Geometry of this tree.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    /// Root hash (stable from creation — the hash region never changes).
    #[must_use]
    pub fn root(&self) -> [u8; 32] {
        self.inner.root()
    }

    /// Reference hash for chunk `chunk_index` (`getHashForLeaf`).
    pub fn hash_for_leaf(&self, chunk_index: u32) -> Result<[u8; 32]> {
        let node = self.inner.shape.chunk_index_to_leaf_node(chunk_index)?;
        Ok(self.inner.hashes[node as usize])
    }

    /// `true` if chunk `chunk_index` has already been verified and saved.
    #[must_use]
    pub fn is_valid(&self, chunk_index: u32) -> bool {
        self.bitset.is_valid(chunk_index)
    }

    /// Number of chunks currently marked valid.
    #[must_use]
    pub fn valid_count(&self) -> u32 {
        self.bitset.valid_count()
    }

    /// `true` once every chunk has been marked valid.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.bitset.is_complete()
    }

    /// Verify `chunk` hashes to the reference leaf hash for `chunk_index`;
    /// if so, persist it via `save` and mark the bit valid in one critical
    /// section (`saveIfValid`), so a concurrent reader never observes a set
    /// bit whose bytes are not yet durable.
    ///
    /// Returns `Ok(false)` without calling `save` if the chunk was already
    /// marked valid, or if `chunk` does not hash to the expected leaf hash —
    /// the caller's fetch was corrupted or the origin lied, and the chunk is
    /// not written. A mismatch is reported as a non-exceptional `false`
    /// return rather than an `Err` (spec §7); callers that need to tell a
    /// genuine mismatch apart from "already valid" can check
    /// [`MerkleState::is_valid`] afterwards.
    pub fn save_if_valid(
        &self,
        chunk_index: u32,
        chunk: &[u8],
        save: impl FnOnce(&[u8]) -> Result<()>,
    ) -> Result<bool> {
        if self.bitset.is_valid(chunk_index) {
            return Ok(false);
        }

        let expected_len = self.inner.shape.actual_chunk_size(chunk_index)?;
        if chunk.len() as u64 != expected_len {
            tracing::warn!(
                chunk_index,
                got = chunk.len(),
                want = expected_len,
                "chunk length mismatch, not saving"
            );
            return Ok(false);
        }

        let expected = self.hash_for_leaf(chunk_index)?;
        let actual = leaf_hash(chunk);
        if actual != expected {
            tracing::warn!(chunk_index, "chunk hash mismatch, not saving");
            return Ok(false);
        }

        save(chunk)?;

        self.bitset.set_valid_and_flush(chunk_index, |bytes| {
            let mut file = self.file.lock();
            write_all_at(&mut file, &self.path, self.bitset_offset, bytes)?;
            file.sync_data().map_err(|e| Error::io_path(&self.path, e))
        })
    }

    /// Promote to a read-only reference if every chunk has been verified
    /// (invariant I7). Does not consume `self`: an incomplete state is
    /// returned as an error so the caller can keep fetching and retry.
    /// Shares the hash region rather than copying it.
    pub fn to_ref(&self) -> Result<MerkleRef> {
        if !self.bitset.is_complete() {
            return Err(Error::IncompleteState {
                valid: self.bitset.valid_count(),
                total: self.inner.shape.leaf_count(),
            });
        }
        tracing::debug!(path = %self.path.display(), "state promoted to reference");
        Ok(MerkleRef::from_shared(Arc::clone(&self.inner)))
    }

    /// Inclusion proof for chunk `chunk_index` (`getPathToRoot`). Valid
    /// regardless of whether the chunk itself has been verified yet — the
    /// hash region is fixed at creation.
    pub fn path_to_root(&self, chunk_index: u32) -> Result<MerkleProof> {
        path_to_root(&self.inner.shape, &self.inner.hashes, chunk_index)
    }
}

impl mlf_core::ValidityView for MerkleState {
    fn is_valid(&self, chunk_index: u32) -> bool {
        self.bitset.is_valid(chunk_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::MerkleRef;

    fn chunk_bytes(shape: &Shape, content: &[u8], idx: u32) -> Vec<u8> {
        let (start, end) = shape.chunk_boundary(idx).unwrap();
        content[start as usize..end as usize].to_vec()
    }

    #[test]
    fn create_from_ref_starts_empty_and_fills_via_save_if_valid() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![5u8; 3 * (1 << 20)];
        let reference = MerkleRef::build_from_bytes(&content).unwrap();

        let state = MerkleState::create_from_ref(&reference, dir.path().join("f.mrkl")).unwrap();
        assert_eq!(state.root(), reference.root());
        assert!(!state.is_complete());

        let shape = *state.shape();
        for i in 0..shape.leaf_count() {
            let bytes = chunk_bytes(&shape, &content, i);
            let newly = state.save_if_valid(i, &bytes, |_| Ok(())).unwrap();
            assert!(newly);
        }
        assert!(state.is_complete());

        let promoted = state.to_ref().unwrap();
        assert_eq!(promoted.root(), reference.root());
    }

    #[test]
    fn save_if_valid_rejects_wrong_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![1u8; 2 * (1 << 20)];
        let reference = MerkleRef::build_from_bytes(&content).unwrap();
        let state = MerkleState::create_from_ref(&reference, dir.path().join("f.mrkl")).unwrap();

        assert!(!state.save_if_valid(0, b"not the real chunk", |_| Ok(())).unwrap());
        assert!(!state.is_valid(0));
    }

    #[test]
    fn save_if_valid_rejects_wrong_length_even_with_matching_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![7u8; 1_572_864];
        let reference = MerkleRef::build_from_bytes(&content).unwrap();
        let state = MerkleState::create_from_ref(&reference, dir.path().join("f.mrkl")).unwrap();
        let shape = *state.shape();

        let last = chunk_bytes(&shape, &content, 1);
        assert_eq!(last.len(), 524_288);
        let mut padded = last.clone();
        padded.extend(std::iter::repeat(0xAAu8).take(1_048_576 - last.len()));

        assert!(!state.save_if_valid(1, &padded, |_| Ok(())).unwrap());
        assert!(!state.is_valid(1));

        assert!(state.save_if_valid(1, &last, |_| Ok(())).unwrap());
        assert!(state.is_valid(1));
    }

    #[test]
    fn to_ref_fails_while_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![1u8; 2 * (1 << 20)];
        let reference = MerkleRef::build_from_bytes(&content).unwrap();
        let state = MerkleState::create_from_ref(&reference, dir.path().join("f.mrkl")).unwrap();

        assert!(matches!(state.to_ref(), Err(Error::IncompleteState { valid: 0, .. })));
    }

    #[test]
    fn save_if_valid_is_idempotent_and_does_not_resave() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![1u8; 2 * (1 << 20)];
        let reference = MerkleRef::build_from_bytes(&content).unwrap();
        let state = MerkleState::create_from_ref(&reference, dir.path().join("f.mrkl")).unwrap();
        let shape = *state.shape();
        let bytes = chunk_bytes(&shape, &content, 0);

        let calls = std::sync::atomic::AtomicU32::new(0);
        let save = |_: &[u8]| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        };
        assert!(state.save_if_valid(0, &bytes, save).unwrap());
        assert!(!state.save_if_valid(0, &bytes, save).unwrap());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn load_roundtrips_partial_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.mrkl");
        let content = vec![1u8; 3 * (1 << 20)];
        let reference = MerkleRef::build_from_bytes(&content).unwrap();
        let state = MerkleState::create_from_ref(&reference, &path).unwrap();
        let shape = *state.shape();
        let bytes = chunk_bytes(&shape, &content, 0);
        state.save_if_valid(0, &bytes, |_| Ok(())).unwrap();
        drop(state);

        let reloaded = MerkleState::load(&path).unwrap();
        assert_eq!(reloaded.valid_count(), 1);
        assert!(reloaded.is_valid(0));
        assert!(!reloaded.is_valid(1));
        assert_eq!(reloaded.root(), reference.root());
    }
}
