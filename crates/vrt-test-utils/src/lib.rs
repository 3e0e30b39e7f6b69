//! Testing utilities for VRT workspace
//!
//! Shared test helpers, fixtures, and fakes.

#![allow(missing_docs)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use warp::Filter as _;
use vrt_core::{HostPattern, HttpClient, HttpResponse, Reporter, RunConfig, TransportError};

pub const LIVE_HOST: &str = "live.example.com";
pub const TEST_HOST: &str = "test.example.com";
pub const BASE_URL: &str = "http://www.example.com";

pub fn png_from(img: &RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    png_from(&RgbaImage::from_pixel(width, height, Rgba(color)))
}

/// `width` x `height` image, left `changed` columns painted black
pub fn striped_png(width: u32, height: u32, changed: u32) -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    for y in 0..height {
        for x in 0..changed.min(width) {
            img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    png_from(&img)
}

pub fn page_with_images(attribute: &str, urls: &[&str]) -> String {
    let imgs: String = urls
        .iter()
        .map(|u| format!("<img class=\"lazy\" {attribute}=\"{u}\">\n"))
        .collect();
    format!("<html><body>\n{imgs}</body></html>")
}

/// Config against the fake hosts, `data-src` attribute, 1% threshold, no tests
pub fn test_config() -> RunConfig {
    RunConfig::new(BASE_URL, HostPattern::new(r"^live\.example\.com$").unwrap(), TEST_HOST)
        .with_image_attribute("data-src")
        .with_max_diff_percentage(1.0)
}

#[derive(Debug, Clone)]
enum Route {
    Respond { status: u16, body: Bytes, delay: Duration },
    Fail(String),
}

/// In-memory HTTP client; unknown URLs answer 404
#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> &Self {
        self.respond_after(url, status, body, Duration::ZERO)
    }

    pub fn respond_after(
        &self,
        url: impl Into<String>,
        status: u16,
        body: impl Into<Bytes>,
        delay: Duration,
    ) -> &Self {
        self.routes.lock().insert(
            url.into(),
            Route::Respond {
                status,
                body: body.into(),
                delay,
            },
        );
        self
    }

    pub fn fail(&self, url: impl Into<String>, message: impl Into<String>) -> &Self {
        self.routes.lock().insert(url.into(), Route::Fail(message.into()));
        self
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().clone()
    }

    pub fn hit_count(&self, url: &str) -> usize {
        self.hits.lock().iter().filter(|h| h.as_str() == url).count()
    }
}

#[async_trait]
impl HttpClient for FakeClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.hits.lock().push(url.to_string());
        let route = self.routes.lock().get(url).cloned();

        match route {
            Some(Route::Respond { status, body, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(HttpResponse::new(status, body))
            }
            Some(Route::Fail(message)) => Err(TransportError::new(message)),
            None => Ok(HttpResponse::new(404, Bytes::new())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Succeed,
    Fail,
    Info,
}

/// Reporter that keeps every event for assertions
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<(EventKind, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(EventKind, String)> {
        self.events.lock().clone()
    }

    pub fn messages(&self, kind: EventKind) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn start(&self, message: &str) {
        self.events.lock().push((EventKind::Start, message.to_string()));
    }

    fn succeed(&self, message: &str) {
        self.events.lock().push((EventKind::Succeed, message.to_string()));
    }

    fn fail(&self, message: &str) {
        self.events.lock().push((EventKind::Fail, message.to_string()));
    }

    fn info(&self, message: &str) {
        self.events.lock().push((EventKind::Info, message.to_string()));
    }
}

/// Local HTTP server answering from a fixed path table; unknown paths 404
pub struct FixtureServer {
    addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl FixtureServer {
    pub async fn start(routes: Vec<(&str, u16, Vec<u8>)>) -> Self {
        let table: Arc<HashMap<String, (u16, Vec<u8>)>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path.to_string(), (status, body)))
                .collect(),
        );

        let filter = warp::path::full().map(move |path: warp::path::FullPath| {
            let (status, body) = table
                .get(path.as_str())
                .cloned()
                .unwrap_or((404, Vec::new()));
            warp::http::Response::builder()
                .status(status)
                .body(body)
                .unwrap()
        });

        let (tx, rx) = oneshot::channel::<()>();
        let (addr, server) = warp::serve(filter).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async move {
            rx.await.ok();
        });
        tokio::spawn(server);

        Self { addr, _shutdown: tx }
    }

    /// `127.0.0.1:<port>`
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}
