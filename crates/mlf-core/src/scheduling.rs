//! Value types shared between the scheduler, the chunk queue, and the painter.

/// Read-only view of a state tree's per-chunk validity, the only thing a
/// [`crate::Shape`]-driven scheduler needs to know about `.mrkl` state.
///
/// Implemented by `mlf-merkle::MerkleState` so `mlf-scheduler` can depend on
/// this trait instead of on `mlf-merkle` directly.
pub trait ValidityView: Send + Sync {
    /// `true` if chunk `chunk_index` has already been verified and saved.
    fn is_valid(&self, chunk_index: u32) -> bool;
}

/// Destination for tasks emitted by [`crate::Shape`]-driven schedulers.
///
/// Implemented by `mlf-queue::ChunkQueue`; a scheduler's default
/// `schedule_downloads` pushes one [`NodeDownloadTask`] per
/// [`SchedulingDecision`] into a `SchedulingTarget` rather than returning
/// tasks directly, so callers can dedup in-flight downloads across calls.
pub trait SchedulingTarget {
    /// Enqueue one download task, typically derived from a
    /// [`SchedulingDecision`] via [`NodeDownloadTask`].
    fn enqueue(&self, task: NodeDownloadTask);
}

/// Why a scheduler chose to emit a particular [`SchedulingDecision`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reason {
    /// A single leaf node exactly covers one required chunk.
    ExactMatch,
    /// An internal node covers a run of required chunks with little waste.
    EfficientCoverage,
    /// Pure look-ahead, no required chunks involved.
    Prefetch,
    /// Smallest possible download for a required chunk.
    MinimalDownload,
    /// Chosen when no better-fitting strategy applied.
    Fallback,
    /// Several adjacent runs merged into one larger node download.
    Consolidation,
    /// Chosen to favor fewer, larger requests over request count.
    CacheOptimization,
    /// Chosen to favor total bytes transferred.
    BandwidthOptimization,
    /// Chosen to favor time-to-first-byte for the caller's range.
    LatencyOptimization,
    /// Speculative prefetch driven by adaptive heuristics.
    SpeculativePrefetch,
}

/// One scheduler-emitted download decision, covering a node in the Merkle
/// tree's flat array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulingDecision {
    /// Node index (in `[0, node_count)`) this decision downloads.
    pub node_index: u32,
    /// Why this decision was made.
    pub reason: Reason,
    /// Scheduling priority; lower values run earlier.
    pub priority: u32,
    /// Estimated bytes this download will transfer.
    pub estimated_bytes: u64,
    /// Subset of the caller's required chunks this decision covers.
    pub required_chunks: Vec<u32>,
    /// All chunks this download will materialize (superset of
    /// `required_chunks` when an ancestor node is chosen).
    pub covered_chunks: Vec<u32>,
    /// Human-readable rationale, useful in logs and tests.
    pub explanation: String,
}

impl SchedulingDecision {
    /// `|required ∩ covered| / |covered|`, or `1.0` when `covered` is empty.
    #[must_use]
    pub fn efficiency(&self) -> f64 {
        if self.covered_chunks.is_empty() {
            return 1.0;
        }
        let required: std::collections::HashSet<_> = self.required_chunks.iter().collect();
        let hit = self
            .covered_chunks
            .iter()
            .filter(|c| required.contains(c))
            .count();
        hit as f64 / self.covered_chunks.len() as f64
    }

    /// `|required ∩ covered| / |required|`, or `1.0` when `required` is empty.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.required_chunks.is_empty() {
            return 1.0;
        }
        let covered: std::collections::HashSet<_> = self.covered_chunks.iter().collect();
        let hit = self
            .required_chunks
            .iter()
            .filter(|c| covered.contains(c))
            .count();
        hit as f64 / self.required_chunks.len() as f64
    }
}

/// A single materialized download task for one Merkle node.
#[derive(Clone, Debug)]
pub struct NodeDownloadTask {
    /// Node index this task downloads.
    pub node_index: u32,
    /// Absolute byte offset into the origin content.
    pub byte_offset: u64,
    /// Byte length of the download.
    pub byte_size: u64,
    /// Whether `node_index` is a leaf (single chunk).
    pub is_leaf: bool,
    /// Half-open chunk range `[lo, hi)` this task covers.
    pub leaf_range: (u32, u32),
}

/// A record of a task that finished (successfully or not), kept for
/// diagnostics by [`crate::Error`]-returning callers and tests.
#[derive(Clone, Debug)]
pub struct CompletedTask {
    /// Node index the task targeted.
    pub node_index: u32,
    /// Absolute byte offset into the origin content.
    pub byte_offset: u64,
    /// Byte length of the download.
    pub byte_size: u64,
    /// Whether `node_index` was a leaf.
    pub is_leaf: bool,
    /// Monotonic completion timestamp (ticks since the queue was created),
    /// avoiding a dependency on wall-clock time in the core.
    pub completed_at_tick: u64,
    /// Whether the transport fetch and verification both succeeded.
    pub success: bool,
    /// Bytes actually transferred (0 on failure before any bytes arrived).
    pub bytes_transferred: u64,
}
