//! A shared completion handle for one in-flight node download.
//!
//! Every caller that needs the same node while a download is already
//! running shares this handle ([`ChunkQueue::get_or_create_future`] is the
//! single atomic operation that guarantees that sharing — spec §4.5/§9),
//! so at most one transport request and one `save_if_valid` attempt happens
//! per node per round.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use mlf_core::Error;

/// Outcome of one node download task: `Ok(())` once the covered chunks are
/// durably saved (or were already valid), or the error every remaining
/// waiter observes once the retry budget for that task is exhausted.
///
/// `Arc<Error>` rather than `Error` because the same outcome is broadcast to
/// every concurrent waiter on the handle, and [`mlf_core::Error`] is not
/// `Clone`.
pub type TaskOutcome = Result<(), Arc<Error>>;

/// The handle returned by [`crate::ChunkQueue::get_or_create_future`].
///
/// Cloning is cheap (it's an `Arc` internally in every caller-visible form);
/// the type itself is never duplicated, only shared via `Arc<InFlight>`.
pub struct InFlight {
    outcome: Mutex<Option<TaskOutcome>>,
    notify: Notify,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Publish the final outcome and wake every current and future waiter.
    /// A second call is a programmer error (one task owns one handle) but is
    /// tolerated as a last-write-wins rather than panicking, since a
    /// defensive retry path calling this twice must never poison the queue.
    pub(crate) fn complete(&self, outcome: TaskOutcome) {
        *self.outcome.lock() = Some(outcome);
        self.notify.notify_waiters();
    }

    /// `true` once [`InFlight::complete`] has been called.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcome.lock().is_some()
    }

    /// Wait for the download this handle represents to finish, returning the
    /// shared outcome. Cancel-safe: dropping the future mid-wait leaves the
    /// handle untouched for every other waiter.
    pub async fn wait(&self) -> TaskOutcome {
        loop {
            // Register interest *before* checking state: a `notify_waiters`
            // call racing with the check is still observed by this
            // already-created `Notified`, so no wakeup can be lost between
            // the check and the await below.
            let notified = self.notify.notified();
            if let Some(outcome) = self.outcome.lock().clone() {
                return outcome;
            }
            notified.await;
        }
    }
}
