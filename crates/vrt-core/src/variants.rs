//! URL variant derivation
//!
//! A delivery URL scraped from a page is turned into three URLs:
//! - the original image on the live host
//! - the same path on the test CDN host
//! - the canonical full-size source, when the path carries a template prefix
//!
//! Template prefixes look like `/jpg/80/0/0/640/480/...`: a 3-4 letter format,
//! a scale factor, two binary flags and two dimensions. The full-size variant
//! zeroes scale and both dimensions.

use crate::error::VariantError;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use url::Url;

static TEMPLATE_PREFIX: OnceLock<Regex> = OnceLock::new();

/// `/<fmt>/<scale>/<flag>/<flag>/<w>/<h>/` anchored at the path start.
fn template_prefix() -> &'static Regex {
    TEMPLATE_PREFIX.get_or_init(|| {
        Regex::new(r"(?i)^/[a-z]{3,4}/([0-9]+)/[01]+/[01]+/([0-9]+)/([0-9]+)/")
            .expect("template prefix pattern is valid")
    })
}

/// The three URLs derived from one delivery URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlVariants {
    /// Delivery URL reduced to scheme, host and path
    pub original_url: String,
    /// Canonical full-resolution URL, absent for non-template paths
    pub full_size_url: Option<String>,
    /// Original path served from the test CDN host
    pub test_url: String,
}

/// Derive original, full-size and test URLs from a delivery URL
///
/// # Errors
/// - `VariantError::Parse` if the URL is not absolute
/// - `VariantError::NoHost` if it carries no host
pub fn derive_variants(delivery_url: &str, test_cdn_host: &str) -> Result<UrlVariants, VariantError> {
    let parsed = Url::parse(delivery_url).map_err(|e| VariantError::Parse {
        url: delivery_url.to_string(),
        reason: e.to_string(),
    })?;

    let host = host_with_port(&parsed).ok_or_else(|| VariantError::NoHost(delivery_url.to_string()))?;
    let path = parsed.path();

    Ok(UrlVariants {
        original_url: build_url(&host, path),
        full_size_url: full_size_path(path).map(|p| build_url(&host, &p)),
        test_url: build_url(test_cdn_host, path),
    })
}

/// Rewrite a template path to its full-size form
///
/// Returns `None` when the path does not start with a template prefix.
/// Fields are replaced by capture span, so equal digit strings in different
/// fields never clobber each other.
#[must_use]
pub fn full_size_path(path: &str) -> Option<String> {
    let captures = template_prefix().captures(path)?;

    let mut out = String::with_capacity(path.len());
    let mut cursor = 0;
    for group in 1..=3 {
        let span = captures.get(group)?;
        out.push_str(&path[cursor..span.start()]);
        out.push('0');
        cursor = span.end();
    }
    out.push_str(&path[cursor..]);

    Some(out)
}

/// Host as it appears in the authority, including an explicit port
#[must_use]
pub fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn build_url(host: &str, path: &str) -> String {
    format!("http://{host}{path}")
}
