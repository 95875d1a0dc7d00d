//! `.mref` files: fully verified, read-only Merkle trees.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use mlf_core::{Error, Footer, Result, Shape, FIXED_FOOTER_SIZE};

use crate::hashing::build_hashes;
use crate::proof::MerkleProof;
use crate::tree::{decode_hashes, encode_hashes, path_to_root, read_exact_at, TreeData};

/// A read-only Merkle tree whose hashes are all known to be valid: either a
/// loaded `.mref` file, or a [`crate::MerkleState`] promoted via
/// [`crate::MerkleState::to_ref`].
///
/// Cheap to clone: the hash region is reference-counted, never copied.
#[derive(Clone)]
pub struct MerkleRef {
    inner: Arc<TreeData>,
}

impl MerkleRef {
    /// Hash every chunk of `content` and build a reference tree in memory.
    pub fn build_from_bytes(content: &[u8]) -> Result<Self> {
        let shape = Shape::new(content.len() as u64);
        let hashes = build_hashes::<Error>(&shape, |idx| {
            let (start, end) = shape.chunk_boundary(idx)?;
            Ok(content[start as usize..end as usize].to_vec())
        })?;
        Ok(Self {
            inner: Arc::new(TreeData { shape, hashes }),
        })
    }

    /// Load a `.mref` file from disk. The footer's internal consistency
    /// (invariant I4) is checked, but chunk bytes are not re-hashed — a
    /// reference file is trusted once its length and footer agree, the same
    /// way a `.mrkl` file's already-verified chunks are trusted.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| Error::io_path(path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| Error::io_path(path, e))?
            .len();

        let mut footer_buf = [0u8; FIXED_FOOTER_SIZE];
        read_exact_at(
            &mut file,
            path,
            file_len - FIXED_FOOTER_SIZE as u64,
            &mut footer_buf,
        )?;
        let footer = Footer::decode(&footer_buf, file_len)?;
        if footer.bit_set_size != 0 {
            return Err(Error::corrupt_format(format!(
                "reference file carries a non-empty bitset region ({} bytes)",
                footer.bit_set_size
            )));
        }
        let shape = footer.shape();

        let mut hash_bytes = vec![0u8; shape.node_count() as usize * 32];
        read_exact_at(&mut file, path, 0, &mut hash_bytes)?;
        let hashes = decode_hashes(&hash_bytes);

        Ok(Self {
            inner: Arc::new(TreeData { shape, hashes }),
        })
    }

    /// Persist this tree as a `.mref` file: hash region, zero-length bitset
    /// region, fixed footer.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path).map_err(|e| Error::io_path(path, e))?;
        file.write_all(&encode_hashes(&self.inner.hashes))
            .map_err(|e| Error::io_path(path, e))?;
        let footer = Footer::from_shape(&self.inner.shape, 0);
        file.write_all(&footer.encode())
            .map_err(|e| Error::io_path(path, e))?;
        file.sync_data().map_err(|e| Error::io_path(path, e))?;
        Ok(())
    }

    /// Geometry of this tree.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    /// Root hash.
    #[must_use]
    pub fn root(&self) -> [u8; 32] {
        self.inner.root()
    }

    /// Hash of chunk `chunk_index` (`getHashForLeaf`).
    pub fn hash_for_leaf(&self, chunk_index: u32) -> Result<[u8; 32]> {
        let node = self.inner.shape.chunk_index_to_leaf_node(chunk_index)?;
        Ok(self.inner.hashes[node as usize])
    }

    /// Hash of flat node `node_index`, leaf or internal (`getHashForIndex`).
    pub fn hash_for_index(&self, node_index: u32) -> Result<[u8; 32]> {
        self.inner
            .hashes
            .get(node_index as usize)
            .copied()
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "node index {node_index} out of range [0, {})",
                    self.inner.hashes.len()
                ))
            })
    }

    /// Inclusion proof for chunk `chunk_index` (`getPathToRoot`).
    pub fn path_to_root(&self, chunk_index: u32) -> Result<MerkleProof> {
        path_to_root(&self.inner.shape, &self.inner.hashes, chunk_index)
    }

    pub(crate) fn from_shared(inner: Arc<TreeData>) -> Self {
        Self { inner }
    }

    pub(crate) fn shared(&self) -> Arc<TreeData> {
        Arc::clone(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_from_bytes_matches_hashing_module() {
        let content = vec![42u8; 3 * (1 << 20)];
        let r = MerkleRef::build_from_bytes(&content).unwrap();
        assert_eq!(r.shape().leaf_count(), 3);
        let expected = crate::hashing::leaf_hash(&content[0..1 << 20]);
        assert_eq!(r.hash_for_leaf(0).unwrap(), expected);
    }

    #[test]
    fn save_then_load_roundtrips_hashes_and_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.mref");
        let content = vec![9u8; 5 * (1 << 20)];
        let built = MerkleRef::build_from_bytes(&content).unwrap();
        built.save(&path).unwrap();

        let loaded = MerkleRef::load(&path).unwrap();
        assert_eq!(loaded.root(), built.root());
        assert_eq!(loaded.shape(), built.shape());
        for i in 0..built.shape().leaf_count() {
            assert_eq!(
                loaded.hash_for_leaf(i).unwrap(),
                built.hash_for_leaf(i).unwrap()
            );
        }
    }

    #[test]
    fn path_to_root_verifies_against_root() {
        let content = vec![3u8; 9 * (1 << 20)];
        let r = MerkleRef::build_from_bytes(&content).unwrap();
        for i in 0..r.shape().leaf_count() {
            let proof = r.path_to_root(i).unwrap();
            assert!(proof.verify(&r.root()));
        }
    }

    #[test]
    fn load_rejects_file_with_bitset_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mref");
        let shape = Shape::new(10);
        let hashes = build_hashes::<Error>(&shape, |_| Ok(vec![0u8; 10])).unwrap();
        let mut file = File::create(&path).unwrap();
        file.write_all(&encode_hashes(&hashes)).unwrap();
        file.write_all(&[0u8; 1]).unwrap(); // phantom bitset byte
        let footer = Footer::from_shape(&shape, 1);
        file.write_all(&footer.encode()).unwrap();
        drop(file);

        assert!(MerkleRef::load(&path).is_err());
    }
}
