//! Inclusion proofs: a leaf hash plus its sibling path to the root.

use crate::hashing::parent_hash;

/// One step of a path from a leaf to the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofStep {
    /// Hash of the sibling subtree at this level.
    pub sibling: [u8; 32],
    /// `true` if `sibling` is the right-hand child (the proof subject was
    /// the left), `false` otherwise.
    pub sibling_is_right: bool,
}

/// A proof that one chunk's hash is included under a given root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    /// Chunk index this proof is for.
    pub leaf_index: u32,
    /// Hash of the chunk itself.
    pub leaf_hash: [u8; 32],
    /// Sibling hashes from the leaf's parent up to the root.
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the implied root and compare it against `root`.
    #[must_use]
    pub fn verify(&self, root: &[u8; 32]) -> bool {
        let mut acc = self.leaf_hash;
        for step in &self.steps {
            acc = if step.sibling_is_right {
                parent_hash(&acc, &step.sibling)
            } else {
                parent_hash(&step.sibling, &acc)
            };
        }
        &acc == root
    }
}
