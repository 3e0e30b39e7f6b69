//! Run orchestration
//!
//! A `Run` owns the declared test cases and the shared resources (HTTP client,
//! comparator, cache, reporter). Tests execute strictly one after another; a
//! failing test never stops the run.

use crate::cache::ImageCache;
use crate::compare::Comparator;
use crate::config::RunConfig;
use crate::error::VrtError;
use crate::fetcher::{HttpClient, ImageFetcher, ReqwestClient};
use crate::orchestrator::TestOrchestrator;
use crate::reporter::{Reporter, TracingReporter};
use crate::types::{RunSummary, TestCase};
use serde::Serialize;
use std::sync::Arc;

/// One execution of all declared tests
pub struct Run<'c, C> {
    config: &'c RunConfig,
    fetcher: ImageFetcher<C>,
    comparator: Comparator,
    cache: Option<ImageCache>,
    reporter: Arc<dyn Reporter>,
    tests: Vec<TestCase>,
}

impl<'c> Run<'c, ReqwestClient> {
    /// Create run with the production HTTP client
    ///
    /// # Errors
    /// `VrtError::Client` if the HTTP client cannot be built.
    pub fn new(config: &'c RunConfig) -> Result<Self, VrtError> {
        let client = ReqwestClient::new(config.fetch_timeout())?;
        Ok(Self::with_client(config, client))
    }
}

impl<'c, C: HttpClient> Run<'c, C> {
    /// Create run over any HTTP client
    #[must_use]
    pub fn with_client(config: &'c RunConfig, client: C) -> Self {
        let cache = config.local_test.then(|| ImageCache::new(config.image_path.clone()));
        Self {
            config,
            fetcher: ImageFetcher::new(client),
            comparator: Comparator::default(),
            cache,
            reporter: Arc::new(TracingReporter),
            tests: config.tests.iter().map(TestCase::from).collect(),
        }
    }

    /// With reporter
    #[inline]
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// With comparator
    #[inline]
    #[must_use]
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Declare an additional test after those from the config
    pub fn test(&mut self, path: impl Into<String>, selector: impl Into<String>) {
        self.tests.push(TestCase::new(path, selector));
    }

    /// Execute every test in declaration order
    ///
    /// Test N+1 starts only after test N reached `Done`.
    pub async fn execute(&mut self) -> RunSummary {
        tracing::info!(tests = self.tests.len(), "run started");

        let orchestrator = TestOrchestrator::new(
            self.config,
            &self.fetcher,
            &self.comparator,
            self.reporter.as_ref(),
        )
        .with_cache(self.cache.as_ref());

        for case in &mut self.tests {
            orchestrator.run(case).await;
        }

        let summary = self.summary();
        tracing::info!(
            tests = summary.tests,
            errored = summary.tests_errored,
            passed = summary.images.passed,
            failed = summary.images.failed,
            indeterminate = summary.images.indeterminate,
            "run finished"
        );
        self.reporter.info(&format!(
            "Run finished: {} tests ({} errored), {} images passed, {} failed, {} indeterminate",
            summary.tests,
            summary.tests_errored,
            summary.images.passed,
            summary.images.failed,
            summary.images.indeterminate
        ));

        summary
    }

    /// Summary over the current state of all tests
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let max = self.config.max_diff_percentage;
        let mut summary = RunSummary {
            tests: self.tests.len(),
            ..RunSummary::default()
        };

        for case in &self.tests {
            if case.error.is_some() {
                summary.tests_errored += 1;
            }
            let tally = case.tally(max);
            summary.images.passed += tally.passed;
            summary.images.failed += tally.failed;
            summary.images.indeterminate += tally.indeterminate;
        }
        summary
    }

    /// Test cases in declaration order
    #[inline]
    #[must_use]
    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    /// Serializable report of the run
    #[must_use]
    pub fn report(&self) -> RunReport<'_> {
        RunReport {
            summary: self.summary(),
            max_diff_percentage: self.config.max_diff_percentage,
            tests: &self.tests,
        }
    }
}

/// Machine-readable run report
#[derive(Debug, Serialize)]
pub struct RunReport<'r> {
    /// Aggregate counts
    pub summary: RunSummary,
    /// Threshold the images were classified against
    pub max_diff_percentage: f64,
    /// Every test with its images
    pub tests: &'r [TestCase],
}
