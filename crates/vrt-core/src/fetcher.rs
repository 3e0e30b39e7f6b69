//! HTTP access for pages and images
//!
//! `HttpClient` is the seam to the network. `ReqwestClient` is the production
//! implementation; tests substitute in-memory clients. `ImageFetcher` adds the
//! status classification used for image downloads.

use crate::error::{ImageFetchError, TransportError, VrtError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Raw HTTP response as seen by the runner
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Body bytes, content-encoding already removed
    pub body: Bytes,
}

impl HttpResponse {
    /// Create new response
    #[inline]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Check for a 2xx status
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal GET-only HTTP client
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET and return status and body bytes
    ///
    /// # Errors
    /// `TransportError` when no response was received.
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        (**self).get(url).await
    }
}

/// `reqwest`-backed client
///
/// Requests advertise gzip, deflate and brotli and bodies are decoded
/// transparently. Bodies are returned as raw bytes, never as text.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with a per-request timeout
    ///
    /// # Errors
    /// `VrtError::Client` if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, VrtError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .user_agent(concat!("vrt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VrtError::Client(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.inner.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse { status, body })
    }
}

/// Image downloader with 404 / status / transport classification
///
/// No retries are attempted.
#[derive(Debug, Clone)]
pub struct ImageFetcher<C> {
    client: C,
}

impl<C: HttpClient> ImageFetcher<C> {
    /// Wrap an HTTP client
    #[inline]
    #[must_use]
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Fetch image bytes
    ///
    /// # Errors
    /// - `ImageFetchError::NotFound` on 404
    /// - `ImageFetchError::UnexpectedStatus` on any other non-2xx status
    /// - `ImageFetchError::Transport` when no response arrived
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, ImageFetchError> {
        let response = self
            .client
            .get(url)
            .await
            .map_err(|source| ImageFetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        match response.status {
            404 => Err(ImageFetchError::NotFound(url.to_string())),
            _ if response.is_success() => Ok(response.body),
            status => Err(ImageFetchError::UnexpectedStatus {
                url: url.to_string(),
                status,
            }),
        }
    }

    /// Underlying client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }
}
