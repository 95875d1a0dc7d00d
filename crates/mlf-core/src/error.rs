//! Shared error taxonomy for the Merkle-verified lazy file engine.
//!
//! Every crate in the workspace surfaces errors through this one enum so a
//! caller can match on category regardless of which layer raised it (shape
//! math, footer decode, hash verification, transport, or channel state).

use std::path::PathBuf;

/// Error categories shared by every crate in the workspace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A bounds or parameter violation a caller should not be able to trigger
    /// through normal use (out-of-range chunk/node index, malformed shape).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `VirtualFile::open` observed a pre-state combination other than the
    /// two legal ones (neither file present, or both present).
    #[error("invalid initial state: {0}")]
    InvalidInitialState(String),

    /// A `.mref`/`.mrkl` file's footer or overall length is inconsistent.
    #[error("corrupt format: {0}")]
    CorruptFormat(String),

    /// Observed chunk bytes did not hash to the reference leaf hash.
    #[error("hash mismatch for chunk {chunk_index}")]
    HashMismatch {
        /// Index of the chunk that failed verification.
        chunk_index: u32,
    },

    /// A filesystem or transport I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A filesystem I/O failure with the offending path attached.
    #[error("io error at {path}: {source}")]
    IoPath {
        /// Path the failing operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Operation attempted on an already-closed channel or state handle.
    #[error("operation on closed handle")]
    Closed,

    /// `MerkleData::to_ref` called on a state whose bitset is not all-ones.
    #[error("state is incomplete: {valid}/{total} chunks verified")]
    IncompleteState {
        /// Number of currently-valid chunks.
        valid: u32,
        /// Total chunk count.
        total: u32,
    },

    /// A policy rule rejected an otherwise well-formed request (e.g. a
    /// `file://` origin at `VirtualFile::open`).
    #[error("policy violation: {0}")]
    Policy(String),
}

impl Error {
    /// Build an [`Error::InvalidArgument`] from a `Display`-able message.
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Build an [`Error::CorruptFormat`] from a `Display`-able message.
    #[must_use]
    pub fn corrupt_format(msg: impl Into<String>) -> Self {
        Self::CorruptFormat(msg.into())
    }

    /// Attach a path to an I/O error.
    #[must_use]
    pub fn io_path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoPath {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
