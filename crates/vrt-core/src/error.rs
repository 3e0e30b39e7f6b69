//! Error types for VRT Core
//!
//! Failures are contained at the smallest enclosing unit:
//! - Image fetch and compare errors degrade a single image to indeterminate
//! - Page fetch and selector errors end a single test
//! - Cache write errors are logged and dropped
//! - Only configuration errors stop a run before it starts

use std::path::PathBuf;

/// Main VRT error type
#[derive(Debug, thiserror::Error)]
pub enum VrtError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The test page could not be retrieved
    #[error("page fetch failed: {0}")]
    PageFetch(#[from] PageFetchError),

    /// The CSS selector of a test does not parse
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector {
        /// Selector as declared
        selector: String,
        /// Parser message
        reason: String,
    },

    /// Page URL built from the base URL and test path does not parse
    #[error("invalid page url `{url}`: {reason}")]
    InvalidPageUrl {
        /// Joined page URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// HTTP client could not be constructed
    #[error("http client error: {0}")]
    Client(String),
}

impl VrtError {
    /// Check if this error only affects a single test
    #[inline]
    #[must_use]
    pub fn is_test_scoped(&self) -> bool {
        matches!(
            self,
            Self::PageFetch(_) | Self::InvalidSelector { .. } | Self::InvalidPageUrl { .. }
        )
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Live CDN host pattern is not a valid regex
    #[error("invalid live CDN host pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// Pattern as configured
        pattern: String,
        /// Regex compiler message
        reason: String,
    },

    /// Required value is empty
    #[error("missing value for `{0}`")]
    Missing(&'static str),

    /// Numeric value outside its allowed range
    #[error("`{field}` out of range: {value}")]
    OutOfRange {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Base URL does not parse
    #[error("invalid base url `{0}`")]
    InvalidBaseUrl(String),

    /// A `PATH=SELECTOR` test declaration is malformed
    #[error("invalid test declaration `{0}`, expected PATH=SELECTOR")]
    InvalidTestDecl(String),
}

/// Transport-level HTTP failure (DNS, connect, reset, timeout)
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    /// Human-readable cause
    pub message: String,
    /// Whether the request hit the client timeout
    pub timed_out: bool,
}

impl TransportError {
    /// Create new transport error
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Mark as timeout
    #[inline]
    #[must_use]
    pub fn timed_out(mut self) -> Self {
        self.timed_out = true;
        self
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let timed_out = err.is_timeout();
        Self {
            message: err.to_string(),
            timed_out,
        }
    }
}

/// Page fetch errors
#[derive(Debug, thiserror::Error)]
pub enum PageFetchError {
    /// Server answered with something other than 200
    #[error("{url} returned status {status}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Request never produced a response
    #[error("{url}: {source}")]
    Transport {
        /// Requested URL
        url: String,
        /// Transport cause
        #[source]
        source: TransportError,
    },
}

/// Per-image fetch errors
#[derive(Debug, thiserror::Error)]
pub enum ImageFetchError {
    /// Server answered 404
    #[error("image not found: {0}")]
    NotFound(String),

    /// Server answered with another non-success status
    #[error("{url} returned status {status}")]
    UnexpectedStatus {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Request never produced a response
    #[error("{url}: {source}")]
    Transport {
        /// Requested URL
        url: String,
        /// Transport cause
        #[source]
        source: TransportError,
    },
}

impl ImageFetchError {
    /// Check if the image is simply missing on the server
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Image comparison errors
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// One of the buffers is empty
    #[error("empty {0} image buffer")]
    Empty(&'static str),

    /// One of the buffers is not a decodable image
    #[error("cannot decode {side} image: {reason}")]
    Decode {
        /// Which side failed (`original` or `test`)
        side: &'static str,
        /// Decoder message
        reason: String,
    },
}

/// Local cache write error, never propagated past the cache
#[derive(Debug, thiserror::Error)]
pub enum CacheWriteError {
    /// Full-size URL yields no usable file path
    #[error("no cache path for {0}")]
    NoPath(String),

    /// Full-size image could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(#[from] ImageFetchError),

    /// Filesystem operation failed
    #[error("cannot write {path}: {source}")]
    Io {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Why an image pair produced no comparison result
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// One side could not be fetched
    #[error(transparent)]
    Fetch(#[from] ImageFetchError),

    /// The pair could not be compared
    #[error(transparent)]
    Compare(#[from] CompareError),
}

/// Delivery URL could not be turned into variants
#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    /// Not an absolute URL
    #[error("cannot parse url `{url}`: {reason}")]
    Parse {
        /// URL as scraped
        url: String,
        /// Parser message
        reason: String,
    },

    /// URL has no host component
    #[error("url `{0}` has no host")]
    NoHost(String),
}
