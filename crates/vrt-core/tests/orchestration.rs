//! Functional tests for test and run orchestration.
//!
//! All traffic goes through the in-memory `FakeClient`, so every scenario is
//! deterministic: page fetch, extraction, pairwise comparison, aggregation and
//! sequencing across tests.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use vrt_core::prelude::*;
use vrt_core::{Comparator, ImageFetcher, TestOrchestrator, TestPhase};
use vrt_test_utils::{
    page_with_images, solid_png, striped_png, test_config, EventKind, FakeClient, RecordingReporter, BASE_URL,
};

const PHOTO: &str = "https://live.example.com/jpg/80/0/0/640/480/photo.jpg";
const PHOTO_ORIGINAL: &str = "http://live.example.com/jpg/80/0/0/640/480/photo.jpg";
const PHOTO_TEST: &str = "http://test.example.com/jpg/80/0/0/640/480/photo.jpg";

fn home_url() -> String {
    format!("{BASE_URL}/home")
}

/// Scenario: one templated image on `/home`, identical on both hosts.
#[tokio::test]
async fn single_image_page_derives_variants_and_passes() {
    let client = FakeClient::new();
    let png = solid_png(16, 16, [200, 10, 10, 255]);
    client
        .respond(home_url(), 200, page_with_images("data-src", &[PHOTO]))
        .respond(PHOTO_ORIGINAL, 200, png.clone())
        .respond(PHOTO_TEST, 200, png);

    let config = test_config().with_test(TestDecl::new("/home", "img.lazy"));
    let mut run = Run::with_client(&config, client.clone());
    let summary = run.execute().await;

    let case = &run.tests()[0];
    assert_eq!(case.phase, TestPhase::Done);
    assert_eq!(case.image_refs.len(), 1);

    let image = &case.image_refs[0];
    assert_eq!(image.original_url, PHOTO_ORIGINAL);
    assert_eq!(image.test_url, PHOTO_TEST);
    assert!(image.full_size_url.as_deref().unwrap().ends_with("/jpg/0/0/0/0/0/photo.jpg"));
    assert_eq!(image.status(config.max_diff_percentage), ImageStatus::Pass);

    assert_eq!(summary.images.passed, 1);
    assert!(summary.is_success());
    assert_eq!(summary.exit_code(), 0);
}

/// The test CDN image is actually compared against the original one.
#[tokio::test]
async fn original_is_compared_against_test_image() {
    let client = FakeClient::new();
    client
        .respond(home_url(), 200, page_with_images("data-src", &[PHOTO]))
        .respond(PHOTO_ORIGINAL, 200, striped_png(10, 10, 0))
        .respond(PHOTO_TEST, 200, striped_png(10, 10, 5));

    let config = test_config().with_test(TestDecl::new("/home", "img"));
    let mut run = Run::with_client(&config, client.clone());
    let summary = run.execute().await;

    let result = run.tests()[0].image_refs[0].result().unwrap().clone();
    assert!(result.is_same_dimensions);
    assert!(result.raw_mismatch_percentage >= 40.0);
    assert_eq!(summary.images.failed, 1);
    assert_eq!(summary.exit_code(), 1);

    assert_eq!(client.hit_count(PHOTO_ORIGINAL), 1);
    assert_eq!(client.hit_count(PHOTO_TEST), 1);
}

/// Scenario: page fetch returns 500, the run continues with the next test.
#[tokio::test]
async fn page_error_is_recorded_and_run_continues() {
    let client = FakeClient::new();
    let png = solid_png(4, 4, [0, 0, 0, 255]);
    client
        .respond(home_url(), 500, "boom")
        .respond(format!("{BASE_URL}/shop"), 200, page_with_images("data-src", &[PHOTO]))
        .respond(PHOTO_ORIGINAL, 200, png.clone())
        .respond(PHOTO_TEST, 200, png);

    let config = test_config()
        .with_test(TestDecl::new("/home", "img"))
        .with_test(TestDecl::new("/shop", "img"));
    let reporter = RecordingReporter::new();
    let mut run = Run::with_client(&config, client).with_reporter(reporter.clone());
    let summary = run.execute().await;

    let home = &run.tests()[0];
    assert!(home.image_refs.is_empty());
    assert!(home.error.as_deref().unwrap().contains("status 500"));
    assert_eq!(home.phase, TestPhase::Done);

    let shop = &run.tests()[1];
    assert!(shop.error.is_none());
    assert_eq!(shop.image_refs.len(), 1);

    assert_eq!(summary.tests, 2);
    assert_eq!(summary.tests_errored, 1);
    assert_eq!(summary.images.passed, 1);
    assert!(!summary.is_success());

    let failures = reporter.messages(EventKind::Fail);
    assert!(failures.iter().any(|m| m.contains("/home") && m.contains("page-fetch")));
}

/// Scenario: test URL answers 404, the image is indeterminate and the test
/// still completes.
#[tokio::test]
async fn missing_test_image_is_indeterminate() {
    let client = FakeClient::new();
    client
        .respond(home_url(), 200, page_with_images("data-src", &[PHOTO]))
        .respond(PHOTO_ORIGINAL, 200, solid_png(4, 4, [0, 0, 0, 255]));

    let config = test_config().with_test(TestDecl::new("/home", "img"));
    let reporter = RecordingReporter::new();
    let mut run = Run::with_client(&config, client).with_reporter(reporter.clone());
    let summary = run.execute().await;

    let case = &run.tests()[0];
    assert_eq!(case.phase, TestPhase::Done);
    let image = &case.image_refs[0];
    assert!(image.result().is_none());
    assert!(image.failure().unwrap().contains("not found"));
    assert_eq!(image.status(100.0), ImageStatus::Indeterminate);

    assert_eq!(summary.images.indeterminate, 1);
    assert!(summary.is_success());
    assert!(reporter
        .messages(EventKind::Fail)
        .iter()
        .any(|m| m.contains("has no result")));
}

#[tokio::test]
async fn transport_failure_and_corrupt_image_are_contained() {
    let a = "https://live.example.com/a.png";
    let b = "https://live.example.com/b.png";
    let client = FakeClient::new();
    let png = solid_png(4, 4, [9, 9, 9, 255]);
    client
        .respond(home_url(), 200, page_with_images("data-src", &[a, b]))
        .fail("http://live.example.com/a.png", "connection reset")
        .respond("http://test.example.com/a.png", 200, png.clone())
        .respond("http://live.example.com/b.png", 200, png)
        .respond("http://test.example.com/b.png", 200, "<html>oops</html>");

    let config = test_config().with_test(TestDecl::new("/home", "img"));
    let mut run = Run::with_client(&config, client);
    let summary = run.execute().await;

    let images = &run.tests()[0].image_refs;
    assert!(images[0].failure().unwrap().contains("connection reset"));
    assert!(images[1].failure().unwrap().contains("decode"));
    assert_eq!(summary.images.indeterminate, 2);
    assert_eq!(summary.tests_errored, 0);
}

/// Lazy-loading markup often omits the scheme; the page scheme is used to
/// read the host and the variants are derived as usual.
#[tokio::test]
async fn protocol_relative_image_urls_are_tested() {
    let client = FakeClient::new();
    let png = solid_png(8, 8, [40, 40, 40, 255]);
    client
        .respond(
            home_url(),
            200,
            page_with_images("data-src", &["//live.example.com/jpg/80/0/0/640/480/photo.jpg"]),
        )
        .respond(PHOTO_ORIGINAL, 200, png.clone())
        .respond(PHOTO_TEST, 200, png);

    let config = test_config().with_test(TestDecl::new("/home", "img"));
    let mut run = Run::with_client(&config, client);
    let summary = run.execute().await;

    let images = &run.tests()[0].image_refs;
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].original_url, PHOTO_ORIGINAL);
    assert_eq!(images[0].test_url, PHOTO_TEST);
    assert_eq!(
        images[0].full_size_url.as_deref(),
        Some("http://live.example.com/jpg/0/0/0/0/0/photo.jpg")
    );
    assert_eq!(summary.images.passed, 1);
}

/// Hosts outside the live CDN pattern never become image references.
#[tokio::test]
async fn foreign_hosts_are_filtered_out() {
    let client = FakeClient::new();
    client.respond(
        home_url(),
        200,
        page_with_images(
            "data-src",
            &[
                "https://other.example.com/jpg/80/0/0/640/480/x.jpg",
                "https://live.example.com.evil.net/y.jpg",
                "/relative/z.jpg",
            ],
        ),
    );

    let config = test_config().with_test(TestDecl::new("/home", "img"));
    let mut run = Run::with_client(&config, client.clone());
    let summary = run.execute().await;

    assert!(run.tests()[0].image_refs.is_empty());
    assert_eq!(summary.images.total(), 0);
    assert_eq!(client.hits(), vec![home_url()]);
}

/// Results are keyed by image, not by completion order.
#[tokio::test]
async fn out_of_order_completion_keeps_results_with_their_images() {
    let urls: Vec<String> = (0..5)
        .map(|i| format!("https://live.example.com/jpg/80/0/0/64/64/img{i}.png"))
        .collect();
    let refs: Vec<&str> = urls.iter().map(String::as_str).collect();

    let client = FakeClient::new();
    client.respond(home_url(), 200, page_with_images("data-src", &refs));
    for i in 0..5u32 {
        let original = format!("http://live.example.com/jpg/80/0/0/64/64/img{i}.png");
        let test = format!("http://test.example.com/jpg/80/0/0/64/64/img{i}.png");
        // Earlier images answer later; image i differs in i of 10 columns.
        let delay = Duration::from_millis(u64::from(5 - i) * 20);
        client
            .respond_after(original, 200, striped_png(10, 10, 0), delay)
            .respond_after(test, 200, striped_png(10, 10, i), delay);
    }

    let config = test_config().with_max_concurrent_images(5);
    let reporter = RecordingReporter::new();
    let fetcher = ImageFetcher::new(client);
    let comparator = Comparator::default();
    let orchestrator = TestOrchestrator::new(&config, &fetcher, &comparator, reporter.as_ref());

    let mut case = TestCase::new("/home", "img.lazy");
    let tally = orchestrator.run(&mut case).await;

    assert_eq!(tally.total(), 5);
    assert!(case.image_refs.iter().all(|image| image.is_settled()));
    for (i, image) in case.image_refs.iter().enumerate() {
        assert!(image.test_url.ends_with(&format!("img{i}.png")));
        let expected = format!("{}.00", i * 10);
        assert_eq!(image.result().unwrap().mismatch_percentage, expected);
    }
}

#[tokio::test]
async fn invalid_selector_ends_only_that_test() {
    let client = FakeClient::new();
    client.respond(home_url(), 200, page_with_images("data-src", &[PHOTO]));

    let config = test_config()
        .with_test(TestDecl::new("/home", "img["))
        .with_test(TestDecl::new("/home", "img"));
    let mut run = Run::with_client(&config, client);
    let summary = run.execute().await;

    assert!(run.tests()[0].error.as_deref().unwrap().contains("invalid selector"));
    assert_eq!(run.tests()[1].image_refs.len(), 1);
    assert_eq!(summary.tests_errored, 1);
}

#[tokio::test]
async fn tests_run_sequentially_in_declaration_order() {
    let client = FakeClient::new();
    for path in ["/a", "/b", "/c"] {
        client.respond_after(
            format!("{BASE_URL}{path}"),
            200,
            "<html></html>",
            Duration::from_millis(10),
        );
    }

    let mut config = test_config();
    for path in ["/a", "/b"] {
        config = config.with_test(TestDecl::new(path, "img"));
    }
    let mut run = Run::with_client(&config, client.clone());
    run.test("/c", "img");
    let summary = run.execute().await;

    assert_eq!(summary.tests, 3);
    assert_eq!(
        client.hits(),
        vec![
            format!("{BASE_URL}/a"),
            format!("{BASE_URL}/b"),
            format!("{BASE_URL}/c")
        ]
    );
}

#[tokio::test]
async fn report_serializes_to_json() {
    let client = FakeClient::new();
    let png = solid_png(2, 2, [1, 2, 3, 255]);
    client
        .respond(home_url(), 200, page_with_images("data-src", &[PHOTO]))
        .respond(PHOTO_ORIGINAL, 200, png.clone())
        .respond(PHOTO_TEST, 200, png);

    let config = test_config().with_test(TestDecl::new("/home", "img"));
    let mut run = Run::with_client(&config, client).with_reporter(Arc::new(vrt_core::SilentReporter));
    run.execute().await;

    let json = serde_json::to_value(run.report()).unwrap();
    assert_eq!(json["summary"]["images"]["passed"], 1);
    assert_eq!(json["tests"][0]["phase"], "done");
    assert_eq!(json["tests"][0]["image_refs"][0]["result"]["mismatch_percentage"], "0.00");
}
