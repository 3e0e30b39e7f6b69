//! Core types for VRT
//!
//! - `TestCase`: one declared page/selector pair and its images
//! - `ImageRef`: one scraped image, its URL variants and its outcome
//! - `ImageStatus`: pass / fail / indeterminate classification
//! - `RunSummary`: aggregate counts for a finished run

use crate::compare::ComparisonResult;
use crate::config::TestDecl;
use crate::variants::UrlVariants;
use serde::Serialize;

/// Lifecycle of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    /// Declared, not started
    Pending,
    /// Fetching the page HTML
    PageFetch,
    /// Selecting elements and deriving URLs
    ImageExtraction,
    /// Fetching and comparing image pairs
    Compare,
    /// Classifying and reporting images
    Aggregate,
    /// Finished, successfully or not
    Done,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::PageFetch => "page-fetch",
            Self::ImageExtraction => "image-extraction",
            Self::Compare => "compare",
            Self::Aggregate => "aggregate",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Classification of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    /// Same dimensions and mismatch within threshold
    Pass,
    /// Compared, but outside the threshold
    Fail,
    /// No comparison result
    Indeterminate,
}

/// One image found on a test page
#[derive(Debug, Clone, Serialize)]
pub struct ImageRef {
    /// Delivery URL on the live host
    pub original_url: String,
    /// Full-size source URL, if the path is templated
    pub full_size_url: Option<String>,
    /// Delivery URL on the test host
    pub test_url: String,
    result: Option<ComparisonResult>,
    failure: Option<String>,
}

impl ImageRef {
    /// Create unsettled image reference
    #[inline]
    #[must_use]
    pub fn new(variants: UrlVariants) -> Self {
        Self {
            original_url: variants.original_url,
            full_size_url: variants.full_size_url,
            test_url: variants.test_url,
            result: None,
            failure: None,
        }
    }

    /// Comparison result, if the cycle produced one
    #[inline]
    #[must_use]
    pub fn result(&self) -> Option<&ComparisonResult> {
        self.result.as_ref()
    }

    /// Reason the cycle produced no result
    #[inline]
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether the fetch-compare cycle has finished
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.result.is_some() || self.failure.is_some()
    }

    /// Record the outcome of the fetch-compare cycle
    ///
    /// An image settles once; later calls are ignored and return `false`.
    pub fn settle(&mut self, outcome: Result<ComparisonResult, String>) -> bool {
        if self.is_settled() {
            tracing::warn!(url = %self.test_url, "image already settled, ignoring outcome");
            return false;
        }
        match outcome {
            Ok(result) => self.result = Some(result),
            Err(reason) => self.failure = Some(reason),
        }
        true
    }

    /// Classify against a threshold percentage
    #[must_use]
    pub fn status(&self, max_diff_percentage: f64) -> ImageStatus {
        match &self.result {
            Some(result) if result.passes(max_diff_percentage) => ImageStatus::Pass,
            Some(_) => ImageStatus::Fail,
            None => ImageStatus::Indeterminate,
        }
    }
}

/// A declared test and everything learned while running it
#[derive(Debug, Clone, Serialize)]
pub struct TestCase {
    /// Page path relative to the base URL
    pub path: String,
    /// CSS selector of image elements
    pub selector: String,
    /// Images in document order
    pub image_refs: Vec<ImageRef>,
    /// Current phase
    pub phase: TestPhase,
    /// Test-level failure (page fetch, selector)
    pub error: Option<String>,
}

impl TestCase {
    /// Create pending test case
    #[inline]
    pub fn new(path: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            selector: selector.into(),
            image_refs: Vec::new(),
            phase: TestPhase::Pending,
            error: None,
        }
    }

    /// Count images per status
    #[must_use]
    pub fn tally(&self, max_diff_percentage: f64) -> StatusTally {
        let mut tally = StatusTally::default();
        for image in &self.image_refs {
            tally.record(image.status(max_diff_percentage));
        }
        tally
    }

    /// Test finished without a test-level error and no image failed
    #[must_use]
    pub fn is_success(&self, max_diff_percentage: f64) -> bool {
        self.error.is_none() && self.tally(max_diff_percentage).failed == 0
    }
}

impl From<&TestDecl> for TestCase {
    fn from(decl: &TestDecl) -> Self {
        Self::new(decl.path.clone(), decl.selector.clone())
    }
}

/// Per-status image counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    /// Passing images
    pub passed: usize,
    /// Failing images
    pub failed: usize,
    /// Images without a result
    pub indeterminate: usize,
}

impl StatusTally {
    /// Add one image
    #[inline]
    pub fn record(&mut self, status: ImageStatus) {
        match status {
            ImageStatus::Pass => self.passed += 1,
            ImageStatus::Fail => self.failed += 1,
            ImageStatus::Indeterminate => self.indeterminate += 1,
        }
    }

    /// Total images counted
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.indeterminate
    }
}

/// Aggregate outcome of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Tests executed
    pub tests: usize,
    /// Tests ended by a test-level error
    pub tests_errored: usize,
    /// Image counts across all tests
    pub images: StatusTally,
}

impl RunSummary {
    /// No image failed and no test errored
    ///
    /// Indeterminate images do not fail a run.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.tests_errored == 0 && self.images.failed == 0
    }

    /// Process exit code for CI use
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }
}
