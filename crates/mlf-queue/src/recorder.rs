//! A throwaway [`SchedulingTarget`] that records exactly the tasks a single
//! scheduling call emits, so [`crate::ChunkQueue::execute_scheduling_with_tasks`]
//! can hand the caller precise futures without serializing unrelated
//! scheduling calls against each other.

use parking_lot::Mutex;

use mlf_core::{NodeDownloadTask, SchedulingTarget};

#[derive(Default)]
pub(crate) struct LocalRecorder {
    tasks: Mutex<Vec<NodeDownloadTask>>,
}

impl LocalRecorder {
    pub(crate) fn into_tasks(self) -> Vec<NodeDownloadTask> {
        self.tasks.into_inner()
    }
}

impl SchedulingTarget for LocalRecorder {
    fn enqueue(&self, task: NodeDownloadTask) {
        self.tasks.lock().push(task);
    }
}
