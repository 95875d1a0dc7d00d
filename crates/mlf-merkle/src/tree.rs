//! Shared hash-region storage and I/O helpers used by both flavors.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use mlf_core::{Error, Result, Shape};

use crate::proof::{MerkleProof, ProofStep};

/// The immutable part of a tree: its geometry and its node hashes.
///
/// Shared via `Arc` between a [`crate::MerkleState`] and the
/// [`crate::MerkleRef`] it is eventually promoted into, so promotion never
/// copies the hash region.
#[derive(Debug)]
pub(crate) struct TreeData {
    pub(crate) shape: Shape,
    pub(crate) hashes: Vec<[u8; 32]>,
}

impl TreeData {
    pub(crate) fn root(&self) -> [u8; 32] {
        self.hashes[0]
    }
}

pub(crate) fn read_exact_at(
    file: &mut File,
    path: &Path,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io_path(path, e))?;
    file.read_exact(buf).map_err(|e| Error::io_path(path, e))
}

pub(crate) fn write_all_at(file: &mut File, path: &Path, offset: u64, buf: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io_path(path, e))?;
    file.write_all(buf).map_err(|e| Error::io_path(path, e))
}

pub(crate) fn decode_hashes(bytes: &[u8]) -> Vec<[u8; 32]> {
    bytes
        .chunks_exact(32)
        .map(|c| c.try_into().expect("chunks_exact(32) yields 32-byte slices"))
        .collect()
}

pub(crate) fn encode_hashes(hashes: &[[u8; 32]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(hashes.len() * 32);
    for h in hashes {
        out.extend_from_slice(h);
    }
    out
}

/// Walk from a leaf to the root, collecting the sibling at each level.
pub(crate) fn path_to_root(
    shape: &Shape,
    hashes: &[[u8; 32]],
    chunk_index: u32,
) -> Result<MerkleProof> {
    let mut node = shape.chunk_index_to_leaf_node(chunk_index)?;
    let leaf_hash = hashes[node as usize];
    let mut steps = Vec::new();

    while node != 0 {
        let parent = (node - 1) / 2;
        let is_left_child = node == 2 * parent + 1;
        let sibling_index = if is_left_child { 2 * parent + 2 } else { 2 * parent + 1 };
        steps.push(ProofStep {
            sibling: hashes[sibling_index as usize],
            sibling_is_right: is_left_child,
        });
        node = parent;
    }

    Ok(MerkleProof {
        leaf_index: chunk_index,
        leaf_hash,
        steps,
    })
}
