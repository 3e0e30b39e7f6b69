//! Image URL extraction from page HTML
//!
//! Parsing is synchronous: the parsed document is not `Send`, so it is built
//! and dropped before the orchestrator awaits anything else.

use crate::config::HostPattern;
use crate::error::VrtError;
use scraper::{Html, Selector};
use url::Url;

/// Why a matched element did not yield a candidate URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skipped {
    /// Element has no such attribute
    MissingAttribute,
    /// Attribute value does not resolve to a URL with a host
    Unparseable(String),
    /// Host does not match the live CDN pattern
    ForeignHost(String),
}

/// Result of scanning one page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Live CDN URLs in document order
    pub urls: Vec<String>,
    /// Matched elements that were dropped
    pub skipped: Vec<Skipped>,
}

impl Extraction {
    /// Number of elements the selector matched
    #[inline]
    #[must_use]
    pub fn matched(&self) -> usize {
        self.urls.len() + self.skipped.len()
    }
}

/// Select elements and collect live-CDN image URLs
///
/// Attribute values are resolved against `page_url`, so protocol-relative
/// (`//host/path`) and root-relative values are judged by their real host.
/// Returned URLs are absolute.
///
/// # Errors
/// `VrtError::InvalidSelector` if `selector` is not valid CSS.
pub fn extract_image_urls(
    html: &str,
    page_url: &Url,
    selector: &str,
    attribute: &str,
    live_cdn: &HostPattern,
) -> Result<Extraction, VrtError> {
    let selector_parsed = Selector::parse(selector).map_err(|e| VrtError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })?;

    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    for element in document.select(&selector_parsed) {
        let Some(value) = element.value().attr(attribute) else {
            extraction.skipped.push(Skipped::MissingAttribute);
            continue;
        };

        let value = value.trim();
        let Some(resolved) = page_url.join(value).ok().filter(|url| url.has_host()) else {
            extraction.skipped.push(Skipped::Unparseable(value.to_string()));
            continue;
        };

        match resolved.host_str() {
            Some(host) if live_cdn.is_match(host) => extraction.urls.push(resolved.to_string()),
            Some(host) => extraction.skipped.push(Skipped::ForeignHost(host.to_string())),
            None => extraction.skipped.push(Skipped::Unparseable(value.to_string())),
        }
    }

    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn live() -> HostPattern {
        HostPattern::new(r"^live\.example\.com$").unwrap()
    }

    fn page() -> Url {
        Url::parse("https://www.example.com/home").unwrap()
    }

    const PAGE: &str = r#"
        <html><body>
          <img class="hero" data-src="https://live.example.com/jpg/80/0/0/640/480/a.jpg">
          <img class="hero" data-src="https://other.example.com/jpg/80/0/0/640/480/b.jpg">
          <img class="hero" src="https://live.example.com/c.jpg">
          <img class="hero" data-src="/relative/d.jpg">
          <div class="hero" data-src="https://live.example.com/e.png"></div>
          <img class="thumb" data-src="https://live.example.com/f.jpg">
        </body></html>
    "#;

    #[test]
    fn keeps_live_cdn_urls_in_document_order() {
        let extraction = extract_image_urls(PAGE, &page(), ".hero", "data-src", &live()).unwrap();

        assert_eq!(
            extraction.urls,
            vec![
                "https://live.example.com/jpg/80/0/0/640/480/a.jpg".to_string(),
                "https://live.example.com/e.png".to_string(),
            ]
        );
        assert_eq!(extraction.matched(), 5);
        assert_eq!(
            extraction.skipped,
            vec![
                Skipped::ForeignHost("other.example.com".to_string()),
                Skipped::MissingAttribute,
                Skipped::ForeignHost("www.example.com".to_string()),
            ]
        );
    }

    #[test]
    fn attribute_is_configurable() {
        let extraction = extract_image_urls(PAGE, &page(), "img.hero", "src", &live()).unwrap();
        assert_eq!(extraction.urls, vec!["https://live.example.com/c.jpg".to_string()]);
    }

    #[test]
    fn invalid_selector_is_reported() {
        let err = extract_image_urls(PAGE, &page(), "img[", "src", &live()).unwrap_err();
        assert!(matches!(err, VrtError::InvalidSelector { .. }));
    }

    #[test]
    fn no_matches_is_empty() {
        let extraction = extract_image_urls(PAGE, &page(), "video", "src", &live()).unwrap();
        assert!(extraction.urls.is_empty());
        assert_eq!(extraction.matched(), 0);
    }

    #[test]
    fn protocol_relative_urls_take_the_page_scheme() {
        let html = r#"<img data-src="//live.example.com/jpg/80/0/0/640/480/photo.jpg">"#;
        let extraction = extract_image_urls(html, &page(), "img", "data-src", &live()).unwrap();

        assert_eq!(
            extraction.urls,
            vec!["https://live.example.com/jpg/80/0/0/640/480/photo.jpg".to_string()]
        );
        assert!(extraction.skipped.is_empty());
    }

    #[test]
    fn hostless_values_are_unparseable() {
        let html = r#"<img src="data:image/png;base64,AAAA">"#;
        let extraction = extract_image_urls(html, &page(), "img", "src", &live()).unwrap();

        assert!(extraction.urls.is_empty());
        assert_eq!(
            extraction.skipped,
            vec![Skipped::Unparseable("data:image/png;base64,AAAA".to_string())]
        );
    }
}
