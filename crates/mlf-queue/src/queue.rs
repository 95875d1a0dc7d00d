//! [`ChunkQueue`]: the pending-task FIFO, the in-flight dedup map, and the
//! completion history, wired together behind one handle the painter holds.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use mlf_core::{CompletedTask, NodeDownloadTask, Result, SchedulingTarget};

use crate::history::CompletionHistory;
use crate::inflight::{InFlight, TaskOutcome};
use crate::recorder::LocalRecorder;

/// Default pending-FIFO capacity; `offer_task` refuses past this point
/// rather than growing unbounded under a pathological scheduler.
pub const DEFAULT_CAPACITY: usize = 4096;
/// Default number of [`CompletedTask`] records retained for diagnostics.
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// The painter's scheduling target: a bounded pending queue plus an
/// in-flight map that guarantees at most one download per node at a time
/// (spec §4.5, §5 "in-flight deduplication").
///
/// Enqueue, dequeue, the in-flight map, and the history ring are each
/// independently guarded so unrelated operations never block on each other;
/// [`ChunkQueue::execute_scheduling_with_tasks`] is the one place a caller's
/// scheduling pass and its dedup bookkeeping happen as a unit.
pub struct ChunkQueue {
    pending: Mutex<VecDeque<NodeDownloadTask>>,
    capacity: usize,
    in_flight: Mutex<HashMap<u32, Arc<InFlight>>>,
    history: CompletionHistory,
    tick: AtomicU64,
}

impl ChunkQueue {
    /// Build a queue with explicit pending/history capacities.
    #[must_use]
    pub fn new(capacity: usize, history_capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            in_flight: Mutex::new(HashMap::new()),
            history: CompletionHistory::new(history_capacity),
            tick: AtomicU64::new(0),
        }
    }

    /// Enqueue a task for a worker to pick up. Returns `false` only if the
    /// pending FIFO is already at capacity; the caller should back off
    /// rather than treat this as fatal.
    pub fn offer_task(&self, task: NodeDownloadTask) -> bool {
        let mut pending = self.pending.lock();
        if pending.len() >= self.capacity {
            return false;
        }
        pending.push_back(task);
        true
    }

    /// Dequeue the next task for a worker, FIFO order.
    pub fn poll_task(&self) -> Option<NodeDownloadTask> {
        self.pending.lock().pop_front()
    }

    /// Number of tasks currently waiting for a worker.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Atomically return the existing in-flight handle for `node_index`, or
    /// create and register a new one. The `bool` is `true` exactly when this
    /// call created the handle — the caller that sees `true` owns driving
    /// the download; every other caller for the same node only waits on the
    /// handle it gets back.
    #[must_use]
    pub fn get_or_create_future(&self, node_index: u32) -> (Arc<InFlight>, bool) {
        let mut in_flight = self.in_flight.lock();
        if let Some(existing) = in_flight.get(&node_index) {
            return (Arc::clone(existing), false);
        }
        let handle = Arc::new(InFlight::new());
        in_flight.insert(node_index, Arc::clone(&handle));
        (handle, true)
    }

    /// `true` if a download for `node_index` is currently in flight.
    #[must_use]
    pub fn is_in_flight(&self, node_index: u32) -> bool {
        self.in_flight.lock().contains_key(&node_index)
    }

    /// Record that `task` finished: remove its in-flight entry, publish the
    /// outcome to every waiter on its handle, and append a
    /// [`CompletedTask`] to the history ring.
    pub fn mark_completed(&self, task: &NodeDownloadTask, success: bool, bytes_transferred: u64, outcome: TaskOutcome) {
        let handle = self.in_flight.lock().remove(&task.node_index);
        if let Some(handle) = handle {
            handle.complete(outcome);
        }

        self.history.push(CompletedTask {
            node_index: task.node_index,
            byte_offset: task.byte_offset,
            byte_size: task.byte_size,
            is_leaf: task.is_leaf,
            completed_at_tick: self.tick.fetch_add(1, Ordering::Relaxed),
            success,
            bytes_transferred,
        });
    }

    /// Snapshot of recently completed tasks, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<CompletedTask> {
        self.history.snapshot()
    }

    /// Run `op` against a throwaway recorder, then fold every task it
    /// emitted through the in-flight map: a task for a node already being
    /// downloaded contributes only its shared handle, a task for a new node
    /// is pushed onto the pending FIFO and its handle returned alongside it.
    ///
    /// Returns `(newly_enqueued_tasks, handles_to_await)` — `handles_to_await`
    /// covers every node this scheduling call touched, so the caller awaits
    /// precisely the downloads relevant to its own read and nothing else
    /// (spec §4.6: "a caller never waits on downloads unrelated to its
    /// range").
    pub fn execute_scheduling_with_tasks(
        &self,
        op: impl FnOnce(&dyn SchedulingTarget) -> Result<()>,
    ) -> Result<(Vec<NodeDownloadTask>, Vec<Arc<InFlight>>)> {
        let recorder = LocalRecorder::default();
        op(&recorder)?;

        let mut newly_enqueued = Vec::new();
        let mut handles = Vec::new();
        for task in recorder.into_tasks() {
            let (handle, is_new) = self.get_or_create_future(task.node_index);
            if is_new {
                self.offer_task(task.clone());
                newly_enqueued.push(task);
            }
            handles.push(handle);
        }
        Ok((newly_enqueued, handles))
    }
}

impl SchedulingTarget for ChunkQueue {
    /// Fire-and-forget enqueue used by a scheduler's default
    /// `schedule_downloads`: dedups against the in-flight map but does not
    /// return a handle. Prefer [`ChunkQueue::execute_scheduling_with_tasks`]
    /// when the caller needs to await completion.
    fn enqueue(&self, task: NodeDownloadTask) {
        let (_, is_new) = self.get_or_create_future(task.node_index);
        if is_new {
            self.offer_task(task);
        }
    }
}

impl Default for ChunkQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(node_index: u32) -> NodeDownloadTask {
        NodeDownloadTask {
            node_index,
            byte_offset: 0,
            byte_size: 1024,
            is_leaf: true,
            leaf_range: (node_index, node_index + 1),
        }
    }

    #[test]
    fn offer_and_poll_is_fifo() {
        let queue = ChunkQueue::default();
        assert!(queue.offer_task(task(0)));
        assert!(queue.offer_task(task(1)));
        assert_eq!(queue.poll_task().unwrap().node_index, 0);
        assert_eq!(queue.poll_task().unwrap().node_index, 1);
        assert!(queue.poll_task().is_none());
    }

    #[test]
    fn offer_task_refuses_past_capacity() {
        let queue = ChunkQueue::new(1, 8);
        assert!(queue.offer_task(task(0)));
        assert!(!queue.offer_task(task(1)));
    }

    #[test]
    fn get_or_create_future_dedupes_same_node() {
        let queue = ChunkQueue::default();
        let (a, a_new) = queue.get_or_create_future(5);
        let (b, b_new) = queue.get_or_create_future(5);
        assert!(a_new);
        assert!(!b_new);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn mark_completed_clears_in_flight_and_records_history() {
        let queue = ChunkQueue::default();
        let (_handle, _) = queue.get_or_create_future(2);
        assert!(queue.is_in_flight(2));

        queue.mark_completed(&task(2), true, 1024, Ok(()));
        assert!(!queue.is_in_flight(2));
        let history = queue.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
    }

    #[test]
    fn execute_scheduling_with_tasks_returns_only_tasks_from_this_call() {
        let queue = ChunkQueue::default();
        // Pre-seed node 9 as already in flight from some other caller.
        let (_preexisting, _) = queue.get_or_create_future(9);

        let (new_tasks, handles) = queue
            .execute_scheduling_with_tasks(|target| {
                target.enqueue(task(9)); // already in flight: no new enqueue
                target.enqueue(task(10)); // fresh: enqueued
                Ok(())
            })
            .unwrap();

        assert_eq!(new_tasks.len(), 1);
        assert_eq!(new_tasks[0].node_index, 10);
        assert_eq!(handles.len(), 2);
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn unrelated_scheduling_calls_do_not_see_each_others_tasks() {
        let queue = ChunkQueue::default();
        let (first, _) = queue
            .execute_scheduling_with_tasks(|target| {
                target.enqueue(task(0));
                Ok(())
            })
            .unwrap();
        let (second, _) = queue
            .execute_scheduling_with_tasks(|target| {
                target.enqueue(task(1));
                Ok(())
            })
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].node_index, second[0].node_index);
    }
}
