// crates/mlf-merkle/src/lib.rs

//! Merkle trees over chunked files: `.mref` (fully verified, read-only) and
//! `.mrkl` (mutable, fills in as chunks are fetched and hash-verified).
//!
//! Both flavors share one hash region computed once at build time and never
//! mutated afterward (invariant I3). What differs is whether a persistent
//! bitset tracks which chunks have actually been confirmed. Promoting a
//! complete state to a reference ([`MerkleState::to_ref`]) shares that hash
//! region instead of copying it.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

mod bitset;
mod hashing;
mod proof;
mod reference;
mod state;
mod tree;

pub use proof::{MerkleProof, ProofStep};
pub use reference::MerkleRef;
pub use state::MerkleState;
