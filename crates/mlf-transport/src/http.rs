//! `reqwest`-backed [`mlf_core::Transport`]: byte-range `GET`s against an
//! HTTP-addressable origin.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};

use mlf_core::{Error, Result, Transport};

/// Fetches exact byte ranges from an HTTP origin using `Range` requests.
///
/// The reference file (`.mref`) lives at the content URL with that suffix
/// appended (spec §6); [`HttpTransport::for_reference`] builds the transport
/// that points at it, sharing the underlying `reqwest::Client` (and its
/// connection pool) with the content transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Build a transport against `url`, using an already-configured
    /// `reqwest::Client` (timeouts, TLS, proxies — all the transport's
    /// business, not the core's, per spec §5).
    #[must_use]
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// The origin URL this transport fetches from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// A transport pointed at this content URL's `.mref` reference file,
    /// sharing this transport's client.
    #[must_use]
    pub fn for_reference(&self) -> Self {
        Self {
            client: self.client.clone(),
            url: format!("{}.mref", self.url),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn size(&self) -> Result<u64> {
        let resp = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(io_err)?;
        if !resp.status().is_success() {
            return Err(Error::Io(std::io::Error::other(format!(
                "HEAD {} returned {}",
                self.url,
                resp.status()
            ))));
        }
        resp.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                Error::Io(std::io::Error::other(format!(
                    "HEAD {} did not return a Content-Length header",
                    self.url
                )))
            })
    }

    async fn fetch_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let last = offset + len - 1;
        let range = format!("bytes={offset}-{last}");
        tracing::trace!(url = %self.url, range = %range, "fetch_range");

        let resp = self
            .client
            .get(&self.url)
            .header(header::RANGE, range)
            .send()
            .await
            .map_err(io_err)?;

        match resp.status() {
            StatusCode::PARTIAL_CONTENT | StatusCode::OK => {}
            status => {
                return Err(Error::Io(std::io::Error::other(format!(
                    "GET {} returned {status}, expected 206 or 200",
                    self.url
                ))));
            }
        }

        let body = resp.bytes().await.map_err(io_err)?;
        if body.len() as u64 != len {
            return Err(Error::Io(std::io::Error::other(format!(
                "GET {} returned {} bytes, expected exactly {len}",
                self.url,
                body.len()
            ))));
        }
        Ok(body)
    }
}

fn io_err(e: reqwest::Error) -> Error {
    Error::Io(std::io::Error::other(e))
}
