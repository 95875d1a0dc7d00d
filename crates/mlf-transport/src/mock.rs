//! An in-memory [`mlf_core::Transport`] double: backs `fetch_range` with a
//! `Vec<u8>`, counts calls so dedup/idempotence tests can assert on exact
//! transport traffic, and supports injecting a bounded number of failures
//! per offset so retry-policy tests don't need a real flaky server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use mlf_core::{Error, Result, Transport};

/// A scripted failure: the `n`th call to `fetch_range(offset, _)` fails
/// instead of returning bytes. Used to exercise the painter's bounded-retry
/// path deterministically.
#[derive(Clone, Copy, Debug)]
pub struct FaultSpec {
    /// Byte offset the fault applies to.
    pub offset: u64,
    /// 1-based call number at this offset that should fail (e.g. `1` fails
    /// only the first attempt, letting a retry succeed).
    pub fail_on_attempt: u32,
}

/// In-memory origin content plus a `fetch_range` call counter and an
/// optional fault schedule, shared by every clone (tests typically hold one
/// `Arc<MockTransport>` and pass it to both the channel under test and their
/// assertions).
pub struct MockTransport {
    content: Vec<u8>,
    calls: AtomicU64,
    attempts_per_offset: Mutex<HashMap<u64, u32>>,
    faults: Vec<FaultSpec>,
}

impl MockTransport {
    /// Build a mock serving exactly `content`, with no injected faults.
    #[must_use]
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            calls: AtomicU64::new(0),
            attempts_per_offset: Mutex::new(HashMap::new()),
            faults: Vec::new(),
        }
    }

    /// Build a mock that fails according to `faults` before otherwise
    /// behaving like [`MockTransport::new`].
    #[must_use]
    pub fn with_faults(content: Vec<u8>, faults: Vec<FaultSpec>) -> Self {
        Self {
            content,
            calls: AtomicU64::new(0),
            attempts_per_offset: Mutex::new(HashMap::new()),
            faults,
        }
    }

    /// Total number of `fetch_range` calls observed so far.
    #[must_use]
    pub fn fetch_range_calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn size(&self) -> Result<u64> {
        Ok(self.content.len() as u64)
    }

    async fn fetch_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let attempt = {
            let mut attempts = self.attempts_per_offset.lock();
            let counter = attempts.entry(offset).or_insert(0);
            *counter += 1;
            *counter
        };
        if self
            .faults
            .iter()
            .any(|f| f.offset == offset && f.fail_on_attempt == attempt)
        {
            return Err(Error::Io(std::io::Error::other(format!(
                "injected fault at offset {offset}, attempt {attempt}"
            ))));
        }

        let start = offset as usize;
        let end = (offset + len) as usize;
        if end > self.content.len() {
            return Err(Error::invalid_argument(format!(
                "range [{start}, {end}) exceeds content length {}",
                self.content.len()
            )));
        }
        Ok(Bytes::copy_from_slice(&self.content[start..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_exact_ranges_and_counts_calls() {
        let transport = MockTransport::new((0..100u16).map(|b| b as u8).collect());
        assert_eq!(transport.size().await.unwrap(), 100);
        let bytes = transport.fetch_range(10, 5).await.unwrap();
        assert_eq!(&bytes[..], &[10, 11, 12, 13, 14]);
        assert_eq!(transport.fetch_range_calls(), 1);
    }

    #[tokio::test]
    async fn injected_fault_fires_once_then_recovers() {
        let transport = MockTransport::with_faults(
            vec![1u8; 16],
            vec![FaultSpec { offset: 0, fail_on_attempt: 1 }],
        );
        assert!(transport.fetch_range(0, 4).await.is_err());
        assert!(transport.fetch_range(0, 4).await.is_ok());
    }

    #[tokio::test]
    async fn out_of_range_fetch_is_an_error() {
        let transport = MockTransport::new(vec![0u8; 8]);
        assert!(transport.fetch_range(4, 8).await.is_err());
    }
}
