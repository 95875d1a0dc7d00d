//! [`VirtualFile`]: the public random-access handle over a Merkle-verified
//! lazy-materialization file — size/read/prebuffer/close, backed by a
//! [`crate::Painter`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mlf_core::Transport;
use mlf_merkle::{MerkleRef, MerkleState};

use crate::cache::CacheFile;
use crate::config::PainterConfig;
use crate::error::{Error, Result};
use crate::painter::Painter;

/// A virtual random-access view over a remote origin, materialized locally
/// chunk by chunk as it is read.
///
/// Persisted state lives in two sibling files next to `cache_path`: the
/// `.mrkl` state file named by `state_path`, and (transiently, only during
/// first-open) a `.mref` reference file fetched from the origin. Spec §4.7's
/// two legal pre-states are enforced by [`VirtualFile::open`]: either neither
/// file exists yet (fresh open) or both already do (resume); any other
/// combination is [`mlf_core::Error::InvalidInitialState`].
pub struct VirtualFile {
    painter: Arc<Painter>,
}

impl VirtualFile {
    /// Open (or resume) a virtual file.
    ///
    /// `origin_url` must not be a `file://` URL — local files should be
    /// opened directly rather than routed through a fetch-and-cache layer
    /// that would just duplicate them (spec §4.7 policy note).
    ///
    /// `reference_transport` must resolve to `origin_url`'s `.mref`
    /// reference file; `content_transport` resolves to the origin content
    /// itself. Callers building on [`mlf_transport::HttpTransport`] get this
    /// pairing from [`mlf_transport::HttpTransport::for_reference`].
    pub async fn open(
        cache_path: impl AsRef<Path>,
        state_path: impl AsRef<Path>,
        origin_url: &str,
        content_transport: Arc<dyn Transport>,
        reference_transport: Arc<dyn Transport>,
        config: PainterConfig,
    ) -> Result<Self> {
        if origin_url.starts_with("file://") {
            return Err(mlf_core::Error::Policy(
                "file:// origins are rejected; open local files directly instead of \
                 routing them through a fetch-and-cache layer"
                    .to_string(),
            )
            .into());
        }

        let cache_path = cache_path.as_ref();
        let state_path = state_path.as_ref();
        let cache_exists = cache_path.exists();
        let state_exists = state_path.exists();

        let (state, cache) = match (cache_exists, state_exists) {
            (false, false) => Self::fresh_open(cache_path, state_path, reference_transport.as_ref()).await?,
            (true, true) => {
                let state = MerkleState::load(state_path).map_err(Error::from)?;
                let cache = CacheFile::open_existing(cache_path).map_err(Error::from)?;
                (Arc::new(state), Arc::new(cache))
            }
            (true, false) | (false, true) => {
                return Err(mlf_core::Error::InvalidInitialState(format!(
                    "cache file present: {cache_exists}, state file present: {state_exists}; \
                     expected both or neither"
                ))
                .into());
            }
        };

        let painter = Arc::new(Painter::new(content_transport, state, cache, config));
        Ok(Self { painter })
    }

    async fn fresh_open(
        cache_path: &Path,
        state_path: &Path,
        reference_transport: &dyn Transport,
    ) -> Result<(Arc<MerkleState>, Arc<CacheFile>)> {
        let ref_size = reference_transport.size().await.map_err(Error::from)?;
        let ref_bytes = reference_transport
            .fetch_range(0, ref_size)
            .await
            .map_err(Error::from)?;

        let ref_path = reference_path_for(state_path);
        std::fs::write(&ref_path, &ref_bytes).map_err(|e| mlf_core::Error::io_path(&ref_path, e))?;
        let reference = MerkleRef::load(&ref_path).map_err(Error::from)?;

        let state = MerkleState::create_from_ref(&reference, state_path).map_err(Error::from)?;
        let cache = CacheFile::create_new(cache_path).map_err(Error::from)?;
        Ok((Arc::new(state), Arc::new(cache)))
    }

    /// Total logical size of the content, in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.painter.state().shape().total_content_size()
    }

    /// Read up to `buf.len()` bytes starting at `position`, blocking on
    /// whatever fetching is needed to validate the covered chunks first.
    /// Returns the number of bytes actually read — `0` only at or past
    /// end-of-file, never as a short read within range.
    pub async fn read(&self, buf: &mut [u8], position: u64) -> Result<usize> {
        let total = self.size();
        if position >= total {
            return Ok(0);
        }
        let len = (buf.len() as u64).min(total - position);
        if len == 0 {
            return Ok(0);
        }

        self.painter.ensure_range(position, position + len).await?;
        self.painter
            .cache()
            .read_at(position, &mut buf[..len as usize])
            .map_err(Error::from)?;
        Ok(len as usize)
    }

    /// Ensure every chunk overlapping `[position, position+length)` is
    /// fetched and verified, without reading any bytes back. Used to warm
    /// the cache ahead of an anticipated read.
    pub async fn prebuffer(&self, position: u64, length: u64) -> Result<()> {
        let total = self.size();
        if position >= total || length == 0 {
            return Ok(());
        }
        let end = (position + length).min(total);
        self.painter.ensure_range(position, end).await
    }

    /// Number of chunks currently verified and cached.
    #[must_use]
    pub fn valid_chunk_count(&self) -> u32 {
        self.painter.state().valid_count()
    }

    /// `true` once every chunk has been fetched and verified.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.painter.state().is_complete()
    }

    /// Close the channel: abort outstanding workers and fsync the cache.
    /// Subsequent `read`/`prebuffer` calls fail with
    /// [`mlf_core::Error::Closed`].
    pub async fn close(&self) -> Result<()> {
        self.painter.close().await
    }
}

fn reference_path_for(state_path: &Path) -> PathBuf {
    state_path.with_extension("mref")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerChoice;
    use mlf_transport::MockTransport;

    fn transports(content: &[u8]) -> (Arc<dyn Transport>, Arc<dyn Transport>) {
        let reference = MerkleRef::build_from_bytes(content).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let ref_path = dir.path().join("scratch.mref");
        reference.save(&ref_path).unwrap();
        let ref_bytes = std::fs::read(&ref_path).unwrap();
        let content_transport: Arc<dyn Transport> = Arc::new(MockTransport::new(content.to_vec()));
        let reference_transport: Arc<dyn Transport> = Arc::new(MockTransport::new(ref_bytes));
        (content_transport, reference_transport)
    }

    #[tokio::test]
    async fn rejects_file_scheme_origins() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![1u8; 1 << 20];
        let (content_transport, reference_transport) = transports(&content);
        let err = VirtualFile::open(
            dir.path().join("f.cache"),
            dir.path().join("f.mrkl"),
            "file:///etc/passwd",
            content_transport,
            reference_transport,
            PainterConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.inner(), mlf_core::Error::Policy(_)));
    }

    #[tokio::test]
    async fn fresh_open_then_read_materializes_requested_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..(2 * (1 << 20))).map(|i| (i % 181) as u8).collect();
        let (content_transport, reference_transport) = transports(&content);

        let file = VirtualFile::open(
            dir.path().join("f.cache"),
            dir.path().join("f.mrkl"),
            "https://example.invalid/f",
            content_transport,
            reference_transport,
            PainterConfig {
                scheduler: SchedulerChoice::Conservative,
                ..PainterConfig::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(file.size(), content.len() as u64);
        let mut buf = vec![0u8; 4096];
        let n = file.read(&mut buf, 0).await.unwrap();
        assert_eq!(n, 4096);
        assert_eq!(&buf[..], &content[0..4096]);
    }

    #[tokio::test]
    async fn resuming_with_only_one_sibling_file_present_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![1u8; 1 << 20];
        let (content_transport, reference_transport) = transports(&content);
        std::fs::write(dir.path().join("f.cache"), []).unwrap();

        let err = VirtualFile::open(
            dir.path().join("f.cache"),
            dir.path().join("f.mrkl"),
            "https://example.invalid/f",
            content_transport,
            reference_transport,
            PainterConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.inner(), mlf_core::Error::InvalidInitialState(_)));
    }

    #[tokio::test]
    async fn read_past_end_of_file_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![1u8; 1024];
        let (content_transport, reference_transport) = transports(&content);
        let file = VirtualFile::open(
            dir.path().join("f.cache"),
            dir.path().join("f.mrkl"),
            "https://example.invalid/f",
            content_transport,
            reference_transport,
            PainterConfig::default(),
        )
        .await
        .unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(file.read(&mut buf, 1024).await.unwrap(), 0);
        assert_eq!(file.read(&mut buf, 10_000).await.unwrap(), 0);
    }
}
