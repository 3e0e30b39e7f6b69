//! Run configuration
//!
//! Loaded from TOML and then treated as immutable for the whole run:
//!
//! ```toml
//! base_url = "https://www.example.com"
//! live_cdn_host = 'live\.example\.com$'
//! test_cdn_host = "test.example.com"
//! image_attribute = "data-src"
//! max_diff_percentage = 1.5
//!
//! [[tests]]
//! path = "/home"
//! selector = "img.lazy"
//! ```

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Compiled live CDN host pattern
///
/// Matched against the host of each scraped image URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostPattern(Regex);

impl HostPattern {
    /// Compile a pattern
    ///
    /// # Errors
    /// `ConfigError::InvalidPattern` if the regex does not compile.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Test a host
    #[inline]
    #[must_use]
    pub fn is_match(&self, host: &str) -> bool {
        self.0.is_match(host)
    }

    /// Source pattern
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for HostPattern {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<HostPattern> for String {
    fn from(value: HostPattern) -> Self {
        value.0.as_str().to_string()
    }
}

/// A declared test: page path and the selector of its images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDecl {
    /// Page path relative to the base URL
    pub path: String,
    /// CSS selector of image elements
    pub selector: String,
}

impl TestDecl {
    /// Create new declaration
    #[inline]
    pub fn new(path: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            selector: selector.into(),
        }
    }
}

impl FromStr for TestDecl {
    type Err = ConfigError;

    /// Parse `PATH=SELECTOR`; the selector may itself contain `=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((path, selector)) if !path.trim().is_empty() && !selector.trim().is_empty() => {
                Ok(Self::new(path.trim(), selector.trim()))
            }
            _ => Err(ConfigError::InvalidTestDecl(s.to_string())),
        }
    }
}

/// Complete configuration of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Site root the test paths are joined to
    pub base_url: String,
    /// Host (optionally with port) of the candidate CDN
    pub test_cdn_host: String,
    /// Pattern identifying live CDN image hosts
    pub live_cdn_host: HostPattern,
    /// HTML attribute holding the image URL
    #[serde(default = "default_image_attribute")]
    pub image_attribute: String,
    /// Highest mismatch percentage that still passes
    #[serde(default)]
    pub max_diff_percentage: f64,
    /// Mirror full-size images into `image_path`
    #[serde(default)]
    pub local_test: bool,
    /// Root of the local image cache
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,
    /// Per-request timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Image pairs compared concurrently within one test
    #[serde(default = "default_max_concurrent_images")]
    pub max_concurrent_images: usize,
    /// Declared tests in run order
    #[serde(default)]
    pub tests: Vec<TestDecl>,
}

fn default_image_attribute() -> String {
    "src".to_string()
}

fn default_image_path() -> PathBuf {
    PathBuf::from("./images")
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_images() -> usize {
    8
}

impl RunConfig {
    /// Create configuration with defaults for everything optional
    #[must_use]
    pub fn new(base_url: impl Into<String>, live_cdn_host: HostPattern, test_cdn_host: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            test_cdn_host: test_cdn_host.into(),
            live_cdn_host,
            image_attribute: default_image_attribute(),
            max_diff_percentage: 0.0,
            local_test: false,
            image_path: default_image_path(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrent_images: default_max_concurrent_images(),
            tests: Vec::new(),
        }
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` or any validation error.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`RunConfig::from_toml`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Check required fields and ranges
    ///
    /// # Errors
    /// The first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("base_url"));
        }
        url::Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidBaseUrl(self.base_url.clone()))?;

        if self.test_cdn_host.trim().is_empty() {
            return Err(ConfigError::Missing("test_cdn_host"));
        }
        if self.image_attribute.trim().is_empty() {
            return Err(ConfigError::Missing("image_attribute"));
        }
        if !(0.0..=100.0).contains(&self.max_diff_percentage) {
            return Err(ConfigError::OutOfRange {
                field: "max_diff_percentage",
                value: self.max_diff_percentage.to_string(),
            });
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "fetch_timeout_secs",
                value: "0".to_string(),
            });
        }
        if self.max_concurrent_images == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_concurrent_images",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Join a test path to the base URL
    ///
    /// Exactly one `/` separates the two regardless of how either is written.
    #[must_use]
    pub fn page_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{base}/")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Per-request timeout
    #[inline]
    #[must_use]
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs)
    }

    /// With image attribute
    #[inline]
    #[must_use]
    pub fn with_image_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.image_attribute = attribute.into();
        self
    }

    /// With mismatch threshold
    #[inline]
    #[must_use]
    pub fn with_max_diff_percentage(mut self, max: f64) -> Self {
        self.max_diff_percentage = max;
        self
    }

    /// With local cache enabled under `image_path`
    #[inline]
    #[must_use]
    pub fn with_local_test(mut self, image_path: impl Into<PathBuf>) -> Self {
        self.local_test = true;
        self.image_path = image_path.into();
        self
    }

    /// With concurrency limit
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_images(mut self, max: usize) -> Self {
        self.max_concurrent_images = max;
        self
    }

    /// With an additional test
    #[inline]
    #[must_use]
    pub fn with_test(mut self, test: TestDecl) -> Self {
        self.tests.push(test);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
        base_url = "https://www.example.com"
        live_cdn_host = 'live\.example\.com'
        test_cdn_host = "test.example.com"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = RunConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.image_attribute, "src");
        assert_eq!(config.max_diff_percentage, 0.0);
        assert!(!config.local_test);
        assert_eq!(config.image_path, PathBuf::from("./images"));
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.max_concurrent_images, 8);
        assert!(config.tests.is_empty());
        assert!(config.live_cdn_host.is_match("live.example.com"));
    }

    #[test]
    fn full_config_with_tests() {
        let text = format!(
            "{MINIMAL}\nimage_attribute = \"data-src\"\nmax_diff_percentage = 2.5\nlocal_test = true\n\
             [[tests]]\npath = \"/home\"\nselector = \"img.lazy\"\n\
             [[tests]]\npath = \"/shop\"\nselector = \".tile img\"\n"
        );
        let config = RunConfig::from_toml(&text).unwrap();

        assert_eq!(config.image_attribute, "data-src");
        assert_eq!(config.max_diff_percentage, 2.5);
        assert!(config.local_test);
        assert_eq!(
            config.tests,
            vec![TestDecl::new("/home", "img.lazy"), TestDecl::new("/shop", ".tile img")]
        );
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let text = MINIMAL.replace(r"live\.example\.com", "live(");
        assert!(RunConfig::from_toml(&text).is_err());
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let text = format!("{MINIMAL}\nmax_diff_percentage = 120.0\n");
        let err = RunConfig::from_toml(&text).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "max_diff_percentage", .. }));
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let err = RunConfig::from_toml("base_url = \"http://a\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn page_url_joins_with_single_slash() {
        let config = RunConfig::new("https://www.example.com/", HostPattern::new("x").unwrap(), "t");
        assert_eq!(config.page_url("/home"), "https://www.example.com/home");
        assert_eq!(config.page_url("home?a=1"), "https://www.example.com/home?a=1");
        assert_eq!(config.page_url(""), "https://www.example.com/");
    }

    #[test]
    fn test_decl_from_str() {
        assert_eq!("/home=img.lazy".parse::<TestDecl>().unwrap(), TestDecl::new("/home", "img.lazy"));
        assert_eq!(
            "/p=img[data-kind=hero]".parse::<TestDecl>().unwrap(),
            TestDecl::new("/p", "img[data-kind=hero]")
        );
        assert!("/home".parse::<TestDecl>().is_err());
        assert!("=img".parse::<TestDecl>().is_err());
    }

    #[test]
    fn pattern_round_trips_through_serde() {
        let config = RunConfig::from_toml(MINIMAL).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["live_cdn_host"], r"live\.example\.com");
    }
}
