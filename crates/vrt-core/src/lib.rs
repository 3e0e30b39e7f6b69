//! VRT Core - CDN image visual-regression testing
//!
//! For every declared page and selector:
//! - Fetches the page and selects image elements
//! - Keeps images served from the live CDN
//! - Derives original, test-CDN and full-size URLs
//! - Downloads both delivery images and compares them pixel by pixel
//! - Classifies each image as pass, fail or indeterminate
//!
//! # Example
//!
//! ```rust,ignore
//! use vrt_core::{Run, RunConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::load("vrt.toml".as_ref())?;
//! let mut run = Run::new(&config)?;
//!
//! let summary = run.execute().await;
//! std::process::exit(summary.exit_code());
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod orchestrator;
pub mod reporter;
pub mod run;
pub mod types;
pub mod variants;

// Re-exports for convenience
pub use cache::{CacheFill, ImageCache};
pub use compare::{compare, CompareConfig, Comparator, ComparisonResult, DimensionDifference, Tolerance};
pub use config::{HostPattern, RunConfig, TestDecl};
pub use error::{
    CacheWriteError, CompareError, ConfigError, ImageError, ImageFetchError, PageFetchError, TransportError,
    VariantError, VrtError,
};
pub use extract::{extract_image_urls, Extraction, Skipped};
pub use fetcher::{HttpClient, HttpResponse, ImageFetcher, ReqwestClient};
pub use orchestrator::TestOrchestrator;
pub use reporter::{Reporter, SilentReporter, TracingReporter};
pub use run::{Run, RunReport};
pub use types::{ImageRef, ImageStatus, RunSummary, StatusTally, TestCase, TestPhase};
pub use variants::{derive_variants, full_size_path, UrlVariants};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with VRT Core
    pub use crate::{
        derive_variants, Comparator, HostPattern, HttpClient, ImageStatus, Reporter, Run, RunConfig, RunSummary,
        TestCase, TestDecl,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
