//! Error type for the channel crate: wraps [`mlf_core::Error`] in an `Arc` so
//! an in-flight download's outcome can be broadcast verbatim to every
//! caller waiting on it ([`mlf_core::Error`] itself is not `Clone`).

use std::fmt;
use std::sync::Arc;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A cheaply-clonable error, either raised locally or broadcast from a
/// shared download handle.
#[derive(Clone, Debug)]
pub struct Error(Arc<mlf_core::Error>);

impl Error {
    /// The underlying error, for callers that want to match on category.
    #[must_use]
    pub fn inner(&self) -> &mlf_core::Error {
        &self.0
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<mlf_core::Error> for Error {
    fn from(e: mlf_core::Error) -> Self {
        Self(Arc::new(e))
    }
}

impl From<Arc<mlf_core::Error>> for Error {
    fn from(e: Arc<mlf_core::Error>) -> Self {
        Self(e)
    }
}
