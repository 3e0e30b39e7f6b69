//! Local full-size image cache
//!
//! In local-test mode every full-size image is mirrored on disk so it can be
//! served from a local CDN. The delivery template prefix is stripped from the
//! URL path and the remainder is mirrored under the cache root:
//!
//! ```text
//! /jpg/0/0/0/0/0/1/2/3/4/5/crop/6/7/8/9/10/products/shoe.jpg
//!   -> <root>/products/shoe.jpg
//! ```
//!
//! Writes are best-effort; callers log failures and move on.

use crate::error::CacheWriteError;
use crate::fetcher::{HttpClient, ImageFetcher};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use url::Url;

static DELIVERY_PREFIX: OnceLock<Regex> = OnceLock::new();

fn delivery_prefix() -> &'static Regex {
    DELIVERY_PREFIX.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^/[a-z]{3,4}/[0-9]+/[01]+/[01]+",
            r"/[0-9]+/[0-9]+/[0-9]+/[0-9]+/[0-9]+/[0-9]+/[0-9]+",
            r"/[a-z]+",
            r"/[0-9]+/[0-9]+/[0-9]+/[0-9]+/[0-9]+/",
        ))
        .expect("delivery prefix pattern is valid")
    })
}

/// Outcome of a cache fill
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheFill {
    /// File already present, nothing fetched
    Present(PathBuf),
    /// File fetched and written
    Written(PathBuf),
}

/// On-disk mirror of full-size images
#[derive(Debug, Clone)]
pub struct ImageCache {
    root: PathBuf,
}

impl ImageCache {
    /// Create cache rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path mirroring a full-size URL
    ///
    /// Returns `None` for unparseable URLs or paths without a file name.
    /// Components other than plain names are dropped so the result always
    /// stays under the root.
    #[must_use]
    pub fn path_for(&self, full_size_url: &str) -> Option<PathBuf> {
        let url = Url::parse(full_size_url).ok()?;
        let stripped = delivery_prefix().replace(url.path(), "/");

        let mut path = self.root.clone();
        let mut pushed = false;
        for component in Path::new(stripped.as_ref()).components() {
            if let Component::Normal(name) = component {
                path.push(name);
                pushed = true;
            }
        }

        if pushed && !url.path().ends_with('/') {
            Some(path)
        } else {
            None
        }
    }

    /// Fetch and store a full-size image unless it is already cached
    ///
    /// # Errors
    /// Any `CacheWriteError`; callers are expected to log and drop it.
    pub async fn fill<C: HttpClient>(
        &self,
        fetcher: &ImageFetcher<C>,
        full_size_url: &str,
    ) -> Result<CacheFill, CacheWriteError> {
        let path = self
            .path_for(full_size_url)
            .ok_or_else(|| CacheWriteError::NoPath(full_size_url.to_string()))?;

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(path = %path.display(), "cache hit");
            return Ok(CacheFill::Present(path));
        }

        let bytes = fetcher.fetch_bytes(full_size_url).await?;
        self.store(&path, &bytes).await?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "cached full-size image");
        Ok(CacheFill::Written(path))
    }

    /// Write bytes to `path`, creating parent directories
    ///
    /// # Errors
    /// `CacheWriteError::Io` on any filesystem failure.
    pub async fn store(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheWriteError> {
        let io_err = |source| CacheWriteError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, bytes).await.map_err(io_err)
    }
}
