//! The painter: the coordinator that turns `ensure_range` calls into
//! scheduling decisions, spawns the workers that drive each newly-discovered
//! download, and verifies+saves arriving bytes through the shared
//! [`mlf_merkle::MerkleState`].
//!
//! "Painter" follows the range-fill metaphor spec §1 uses for the
//! component that paints in missing regions of the virtual file as they're
//! requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use mlf_core::{NodeDownloadTask, Transport};
use mlf_merkle::MerkleState;
use mlf_queue::ChunkQueue;
use mlf_scheduler::Scheduler;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::cache::CacheFile;
use crate::config::PainterConfig;
use crate::error::{Error, Result};

/// Coordinates fetch-verify-save for one virtual file.
///
/// Cheap to share: every field is itself reference-counted or internally
/// synchronized, so [`Painter::ensure_range`] only ever needs `&Arc<Self>`.
pub struct Painter {
    scheduler: Box<dyn Scheduler>,
    queue: Arc<ChunkQueue>,
    transport: Arc<dyn Transport>,
    state: Arc<MerkleState>,
    cache: Arc<CacheFile>,
    config: PainterConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Bounds how many `fetch_range` calls run concurrently, regardless of
    /// how many worker loops are spawned (spec §5: "parallel worker threads
    /// driven by a bounded pool").
    permits: Arc<tokio::sync::Semaphore>,
    closed: AtomicBool,
}

impl Painter {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        state: Arc<MerkleState>,
        cache: Arc<CacheFile>,
        config: PainterConfig,
    ) -> Self {
        let scheduler = config.scheduler.build();
        let permits = Arc::new(tokio::sync::Semaphore::new(config.worker_count.max(1)));
        Self {
            scheduler,
            queue: Arc::new(ChunkQueue::new(config.queue_capacity, config.history_capacity)),
            transport,
            state,
            cache,
            config,
            workers: Mutex::new(Vec::new()),
            permits,
            closed: AtomicBool::new(false),
        }
    }

    /// Block until every chunk overlapping `[start, end)` is valid in the
    /// shared state, fetching and verifying whatever is missing.
    ///
    /// Dedups against any download already in flight for the same node
    /// (spec §4.5/§4.6), including ones started by a concurrent
    /// `ensure_range` call on the same [`crate::VirtualFile`] — each caller
    /// only waits on the handles relevant to its own range.
    pub async fn ensure_range(self: &Arc<Self>, start: u64, end: u64) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(mlf_core::Error::Closed.into());
        }
        if end <= start {
            return Ok(());
        }

        let shape = *self.state.shape();
        let state = Arc::clone(&self.state);
        let scheduler = &self.scheduler;
        let (new_tasks, handles) = self.queue.execute_scheduling_with_tasks(|target| {
            scheduler.schedule_downloads(start, end - start, &shape, state.as_ref(), target)
        })?;

        let mut workers = self.workers.lock();
        workers.retain(|h| !h.is_finished());
        for _ in &new_tasks {
            let painter = Arc::clone(self);
            workers.push(tokio::spawn(async move { painter.worker_loop().await }));
        }
        drop(workers);

        for handle in handles {
            handle.wait().await.map_err(Error::from)?;
        }
        Ok(())
    }

    /// One worker: acquire a permit (bounding concurrent `fetch_range` calls
    /// to `config.worker_count`), pull the next task off the shared FIFO,
    /// drive it, and repeat until the queue is empty. Several worker loops
    /// may run concurrently, each competing for permits and for tasks off
    /// the same queue, which is what lets one loop pick up work enqueued by
    /// a sibling `ensure_range` call rather than only ever touching the
    /// task that triggered its own spawn.
    async fn worker_loop(self: Arc<Self>) {
        loop {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                return;
            };
            let Some(task) = self.queue.poll_task() else {
                drop(permit);
                return;
            };
            self.run_task(task).await;
            drop(permit);
        }
    }

    /// Drive one download to completion: bounded retry on transport errors,
    /// immediate failure (no retry) on a hash mismatch since the bytes that
    /// arrived are definitively wrong. Always reports back through
    /// [`ChunkQueue::mark_completed`] so every waiter on this node's handle
    /// observes the same outcome.
    async fn run_task(self: Arc<Self>, task: NodeDownloadTask) {
        let mut attempt = 0u32;
        let result = loop {
            attempt += 1;
            match self.transport.fetch_range(task.byte_offset, task.byte_size).await {
                Ok(bytes) => break self.verify_and_save(&task, &bytes),
                Err(e) if attempt < self.config.max_attempts => {
                    let backoff = self.config.backoff_base
                        * self.config.backoff_factor.saturating_pow(attempt - 1);
                    tracing::warn!(
                        node = task.node_index,
                        attempt,
                        ?backoff,
                        error = %e,
                        "fetch_range failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                Err(e) => break Err(e),
            }
        };

        let success = result.is_ok();
        let bytes_transferred = if success { task.byte_size } else { 0 };
        let outcome = result.map_err(Arc::new);
        self.queue.mark_completed(&task, success, bytes_transferred, outcome);
    }

    /// Verify and save every leaf chunk a node's downloaded bytes cover.
    /// `save_if_valid` is idempotent, so this is safe to run even for chunks
    /// another concurrent task already validated — a deliberate consequence
    /// of coalescing strategies that may re-download an already-valid
    /// neighbor alongside a missing chunk.
    ///
    /// `save_if_valid` reports a hash/length mismatch as `Ok(false)` rather
    /// than an `Err` (spec §7); a `false` for a chunk this task's caller
    /// still needs (i.e. not already valid going in) is a genuine
    /// verification failure and is turned into a fatal [`Error::HashMismatch`]
    /// here so `run_task`'s no-retry-on-mismatch rule still applies.
    fn verify_and_save(&self, task: &NodeDownloadTask, bytes: &Bytes) -> mlf_core::Result<()> {
        let shape = *self.state.shape();
        let (lo, hi) = task.leaf_range;
        for chunk_index in lo..hi {
            let (start, end) = shape.chunk_boundary(chunk_index)?;
            let rel_start = usize::try_from(start - task.byte_offset).unwrap_or(usize::MAX);
            let rel_end = usize::try_from(end - task.byte_offset).unwrap_or(usize::MAX);
            let slice = &bytes[rel_start..rel_end];
            let cache = Arc::clone(&self.cache);
            let saved = self
                .state
                .save_if_valid(chunk_index, slice, |data| cache.write_at(start, data))?;
            if !saved && !self.state.is_valid(chunk_index) {
                return Err(mlf_core::Error::HashMismatch { chunk_index });
            }
        }
        Ok(())
    }

    /// Abort outstanding workers, complete any still-pending tasks with
    /// [`mlf_core::Error::Closed`], and fsync the cache file. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for handle in std::mem::take(&mut *self.workers.lock()) {
            handle.abort();
        }
        while let Some(task) = self.queue.poll_task() {
            self.queue
                .mark_completed(&task, false, 0, Err(Arc::new(mlf_core::Error::Closed)));
        }
        self.cache.sync().map_err(Error::from)
    }

    pub(crate) fn state(&self) -> &Arc<MerkleState> {
        &self.state
    }

    pub(crate) fn cache(&self) -> &Arc<CacheFile> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerChoice;
    use mlf_merkle::MerkleRef;
    use mlf_transport::MockTransport;

    fn build_painter(content: &[u8], dir: &std::path::Path) -> (Arc<Painter>, Arc<MerkleState>) {
        let reference = MerkleRef::build_from_bytes(content).unwrap();
        let state = Arc::new(MerkleState::create_from_ref(&reference, dir.join("f.mrkl")).unwrap());
        let cache = Arc::new(CacheFile::create_new(dir.join("f.cache")).unwrap());
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new(content.to_vec()));
        let painter = Arc::new(Painter::new(
            transport,
            Arc::clone(&state),
            cache,
            PainterConfig {
                scheduler: SchedulerChoice::Conservative,
                ..PainterConfig::default()
            },
        ));
        (painter, state)
    }

    #[tokio::test]
    async fn ensure_range_fills_and_verifies_requested_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..(3 * (1 << 20))).map(|i| (i % 251) as u8).collect();
        let (painter, state) = build_painter(&content, dir.path());

        painter.ensure_range(0, 1 << 20).await.unwrap();
        assert!(state.is_valid(0));
        assert!(!state.is_valid(1));

        let mut buf = vec![0u8; 1 << 20];
        painter.cache().read_at(0, &mut buf).unwrap();
        assert_eq!(buf, content[0..1 << 20]);
    }

    #[tokio::test]
    async fn concurrent_ensure_range_for_the_same_chunk_dedups_transport_calls() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = vec![9u8; 2 * (1 << 20)];
        let (painter, _state) = build_painter(&content, dir.path());

        let a = Arc::clone(&painter);
        let b = Arc::clone(&painter);
        let (r1, r2) = tokio::join!(a.ensure_range(0, 1024), b.ensure_range(0, 1024));
        r1.unwrap();
        r2.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = vec![1u8; 1 << 20];
        let (painter, _state) = build_painter(&content, dir.path());
        painter.close().await.unwrap();
        painter.close().await.unwrap();
    }

    #[tokio::test]
    async fn ensure_range_after_close_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = vec![1u8; 1 << 20];
        let (painter, _state) = build_painter(&content, dir.path());
        painter.close().await.unwrap();
        assert!(painter.ensure_range(0, 1024).await.is_err());
    }
}
