//! The byte-range fetch port the core consumes. The core never speaks HTTP
//! directly; `mlf-transport` provides the concrete implementation, and tests
//! use an in-memory double against the same trait.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Abstract origin: total size plus exact byte-range reads.
///
/// Implementations must be safe for concurrent `fetch_range` calls; the
/// painter and chunk queue rely on that to run multiple downloads at once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Total size of the origin content, in bytes.
    async fn size(&self) -> Result<u64>;

    /// Fetch exactly `len` bytes starting at `offset`. Implementations must
    /// return an error rather than a short read; the origin is expected to
    /// support HTTP Range or an equivalent exact-slice semantics.
    async fn fetch_range(&self, offset: u64, len: u64) -> Result<Bytes>;
}
