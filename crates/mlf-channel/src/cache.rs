//! The `.cache` file: a plain byte store addressed by absolute content
//! offset. Chunks are only ever written here after
//! [`mlf_merkle::MerkleState::save_if_valid`] has verified them, and only
//! ever read back after the caller has confirmed the covering chunk is
//! valid — the cache file itself carries no validity information.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use mlf_core::{Error, Result};

pub(crate) struct CacheFile {
    file: Mutex<File>,
    path: PathBuf,
}

impl CacheFile {
    /// Create a fresh, empty cache file. Fails if one already exists at
    /// `path` — the caller is responsible for only reaching this branch on
    /// the "neither file present" pre-state.
    pub(crate) fn create_new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Error::io_path(&path, e))?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Open an existing cache file in place.
    pub(crate) fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io_path(&path, e))?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Write `bytes` at absolute content offset `offset` and fsync before
    /// returning, so the bitset bit `MerkleState::save_if_valid` is about to
    /// set never outlives the data it claims is durable.
    pub(crate) fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io_path(&self.path, e))?;
        file.write_all(bytes)
            .map_err(|e| Error::io_path(&self.path, e))?;
        file.sync_data().map_err(|e| Error::io_path(&self.path, e))
    }

    /// Read exactly `buf.len()` bytes starting at absolute content offset
    /// `offset`. Callers must only call this for ranges already confirmed
    /// valid.
    pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io_path(&self.path, e))?;
        file.read_exact(buf)
            .map_err(|e| Error::io_path(&self.path, e))
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.file
            .lock()
            .sync_all()
            .map_err(|e| Error::io_path(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.cache");
        let cache = CacheFile::create_new(&path).unwrap();
        cache.write_at(1024, b"hello").unwrap();

        let mut buf = [0u8; 5];
        cache.read_at(1024, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn create_new_refuses_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.cache");
        CacheFile::create_new(&path).unwrap();
        assert!(CacheFile::create_new(&path).is_err());
    }
}
