//! Bounded ring of recently finished tasks, kept for diagnostics only — it
//! plays no part in correctness (the bitset is the single source of truth
//! for what's valid).

use std::collections::VecDeque;

use parking_lot::Mutex;

use mlf_core::CompletedTask;

/// A fixed-capacity FIFO of [`CompletedTask`] records; pushing past capacity
/// evicts the oldest entry.
pub struct CompletionHistory {
    entries: Mutex<VecDeque<CompletedTask>>,
    capacity: usize,
}

impl CompletionHistory {
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(&self, entry: CompletedTask) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot the current history, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CompletedTask> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of entries currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// `true` if no task has completed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
