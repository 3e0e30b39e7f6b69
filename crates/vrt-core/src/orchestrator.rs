//! Test orchestration
//!
//! Drives one `TestCase` through its phases:
//!
//! 1. PageFetch: GET the page, anything but 200 ends the test with an error
//! 2. ImageExtraction: select elements, keep live-CDN URLs, derive variants
//! 3. Compare: fetch original and test images and compare them, bounded
//!    concurrency, results written back by index
//! 4. Aggregate: classify and report every image
//! 5. Done
//!
//! Failures never escape the test: page errors are recorded on the case,
//! image errors on the image.
//!
//! Decoding and pixel comparison run inline on the calling task. While one
//! pair is being compared the other in-flight fetches of the same test are
//! not polled; `max_concurrent_images` bounds how much work queues up behind
//! it.

use crate::cache::{CacheFill, ImageCache};
use crate::compare::{Comparator, ComparisonResult};
use crate::config::RunConfig;
use crate::error::{ImageError, PageFetchError, VrtError};
use crate::extract::extract_image_urls;
use crate::fetcher::{HttpClient, ImageFetcher};
use crate::reporter::Reporter;
use crate::types::{ImageRef, ImageStatus, StatusTally, TestCase, TestPhase};
use crate::variants::derive_variants;
use futures::StreamExt;
use url::Url;

/// Runs a single test case against the configured hosts
pub struct TestOrchestrator<'a, C> {
    config: &'a RunConfig,
    fetcher: &'a ImageFetcher<C>,
    comparator: &'a Comparator,
    cache: Option<&'a ImageCache>,
    reporter: &'a dyn Reporter,
}

impl<'a, C: HttpClient> TestOrchestrator<'a, C> {
    /// Create orchestrator over borrowed run resources
    #[inline]
    #[must_use]
    pub fn new(
        config: &'a RunConfig,
        fetcher: &'a ImageFetcher<C>,
        comparator: &'a Comparator,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            config,
            fetcher,
            comparator,
            cache: None,
            reporter,
        }
    }

    /// With local full-size cache
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: Option<&'a ImageCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Run the test to completion
    ///
    /// Returns the per-status tally. On return `case.phase` is `Done` and
    /// every image in `case.image_refs` is settled.
    pub async fn run(&self, case: &mut TestCase) -> StatusTally {
        tracing::info!("Running test {} with selector '{}'", case.path, case.selector);

        if let Err(err) = self.drive(case).await {
            tracing::warn!(path = %case.path, phase = %case.phase, error = %err, "test ended early");
            self.reporter.fail(&format!(
                "Test '{}' with selector '{}' failed during {}: {err}",
                case.path, case.selector, case.phase
            ));
            case.error = Some(err.to_string());
        }
        case.phase = TestPhase::Done;
        case.tally(self.config.max_diff_percentage)
    }

    async fn drive(&self, case: &mut TestCase) -> Result<(), VrtError> {
        case.phase = TestPhase::PageFetch;
        let page_url = self.config.page_url(&case.path);
        self.reporter.start(&format!("Getting content from page {page_url}"));
        let html = self.fetch_page(&page_url).await?;
        self.reporter.succeed(&format!("Got content from page {page_url}"));

        case.phase = TestPhase::ImageExtraction;
        self.collect_images(case, &page_url, &html)?;
        tracing::info!("Extracted {} images from {page_url}", case.image_refs.len());

        case.phase = TestPhase::Compare;
        self.reporter.start(&format!(
            "Testing {} images from page '{page_url}' with selector '{}'",
            case.image_refs.len(),
            case.selector
        ));
        self.compare_all(&mut case.image_refs).await;

        case.phase = TestPhase::Aggregate;
        self.report(case, &page_url);
        Ok(())
    }

    async fn fetch_page(&self, url: &str) -> Result<String, PageFetchError> {
        let response = self
            .fetcher
            .client()
            .get(url)
            .await
            .map_err(|source| PageFetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        if response.status != 200 {
            return Err(PageFetchError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    fn collect_images(&self, case: &mut TestCase, page_url: &str, html: &str) -> Result<(), VrtError> {
        let base = Url::parse(page_url).map_err(|e| VrtError::InvalidPageUrl {
            url: page_url.to_string(),
            reason: e.to_string(),
        })?;
        let extraction = extract_image_urls(
            html,
            &base,
            &case.selector,
            &self.config.image_attribute,
            &self.config.live_cdn_host,
        )?;

        for skipped in &extraction.skipped {
            tracing::debug!(?skipped, "element skipped");
        }

        for url in extraction.urls {
            match derive_variants(&url, &self.config.test_cdn_host) {
                Ok(variants) => case.image_refs.push(ImageRef::new(variants)),
                Err(err) => tracing::warn!(%url, error = %err, "cannot derive url variants"),
            }
        }
        Ok(())
    }

    async fn compare_all(&self, images: &mut [ImageRef]) {
        let targets: Vec<(usize, String, String, Option<String>)> = images
            .iter()
            .enumerate()
            .map(|(index, image)| {
                (
                    index,
                    image.original_url.clone(),
                    image.test_url.clone(),
                    image.full_size_url.clone(),
                )
            })
            .collect();

        let mut outcomes = futures::stream::iter(targets)
            .map(|(index, original, test, full_size)| async move {
                let outcome = self.cycle(&original, &test, full_size.as_deref()).await;
                (index, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_images.max(1));

        while let Some((index, outcome)) = outcomes.next().await {
            let image = &mut images[index];
            if let Err(err) = &outcome {
                tracing::warn!(url = %image.test_url, error = %err, "image has no result");
            }
            image.settle(outcome.map_err(|e| e.to_string()));
        }
    }

    /// Fetch-compare cycle for one image, plus the cache fill in local mode
    async fn cycle(
        &self,
        original: &str,
        test: &str,
        full_size: Option<&str>,
    ) -> Result<ComparisonResult, ImageError> {
        let fill_cache = async {
            let (Some(cache), Some(url)) = (self.cache, full_size) else {
                return;
            };
            match cache.fill(self.fetcher, url).await {
                Ok(CacheFill::Written(path)) => {
                    tracing::info!(path = %path.display(), "cached full-size image");
                }
                Ok(CacheFill::Present(_)) => {}
                Err(err) => tracing::warn!(%url, error = %err, "cache write failed"),
            }
        };

        let (outcome, ()) = tokio::join!(self.fetch_and_compare(original, test), fill_cache);
        outcome
    }

    async fn fetch_and_compare(&self, original: &str, test: &str) -> Result<ComparisonResult, ImageError> {
        let (original_bytes, test_bytes) =
            tokio::join!(self.fetcher.fetch_bytes(original), self.fetcher.fetch_bytes(test));
        let original_bytes = original_bytes?;
        let test_bytes = test_bytes?;

        let result = self.comparator.compare(&original_bytes, &test_bytes)?;
        tracing::debug!(url = %test, mismatch = %result.mismatch_percentage, "compared");
        Ok(result)
    }

    fn report(&self, case: &TestCase, page_url: &str) {
        let max = self.config.max_diff_percentage;

        for image in &case.image_refs {
            match (image.status(max), image.result()) {
                (ImageStatus::Pass, Some(result)) => self.reporter.succeed(&format!(
                    "Image {} passed, mismatch = {}%",
                    image.test_url, result.mismatch_percentage
                )),
                (ImageStatus::Fail, Some(result)) => self.reporter.fail(&format!(
                    "Image {} failed. Same dimensions = {}, mismatch = {}%",
                    image.test_url, result.is_same_dimensions, result.mismatch_percentage
                )),
                _ => self.reporter.fail(&format!(
                    "Image {} has no result: {}",
                    image.test_url,
                    image.failure().unwrap_or("unknown")
                )),
            }
        }

        let tally = case.tally(max);
        self.reporter.info(&format!(
            "Tested {} images from page '{page_url}' with selector '{}': {} passed, {} failed, {} indeterminate",
            tally.total(),
            case.selector,
            tally.passed,
            tally.failed,
            tally.indeterminate
        ));
    }
}
