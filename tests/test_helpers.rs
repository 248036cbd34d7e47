//! # Test Helper Library
//!
//! Common setup for the integration tests: an in-process HTTP stub that counts
//! connections, a closed local port for forced network failure, sample images,
//! and fake OCR engines.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, RgbImage};
use label_measure::config::FetchConfig;
use label_measure::ocr::OcrEngine;
use label_measure::ocr_errors::OcrError;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A minimal HTTP/1.1 server answering GETs from a fixed route table
pub struct StubServer {
    pub base_url: String,
    connections: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl StubServer {
    /// Full URL for a path on this server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Number of TCP connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a stub server. Paths missing from `routes` answer 404.
pub async fn start_stub_server(routes: HashMap<String, Vec<u8>>) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().expect("Stub server has an address");
    let connections = Arc::new(AtomicUsize::new(0));
    let routes = Arc::new(routes);

    let counter = Arc::clone(&connections);
    let task = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let routes = Arc::clone(&routes);

            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            request.extend_from_slice(&buf[..n]);
                            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }

                let request = String::from_utf8_lossy(&request);
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|target| target.split('?').next())
                    .unwrap_or("/")
                    .to_string();

                let (status, body) = match routes.get(&path) {
                    Some(body) => ("200 OK", body.clone()),
                    None => ("404 Not Found", b"not found".to_vec()),
                };
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(&body).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    StubServer {
        base_url: format!("http://{}", addr),
        connections,
        task,
    }
}

/// A URL on a local port nothing listens on
pub fn closed_port_url(path: &str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind spare port");
    let port = listener
        .local_addr()
        .expect("Spare port has an address")
        .port();
    drop(listener);
    format!("http://127.0.0.1:{}{}", port, path)
}

/// A PNG of the given size
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40])));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("Failed to encode sample PNG");
    buffer.into_inner()
}

/// Write a sample PNG to `path`
pub fn write_sample_png(path: &Path, width: u32, height: u32) {
    std::fs::write(path, sample_png(width, height)).expect("Failed to write sample PNG");
}

/// Fetch settings suited to tests: short delays, three attempts
pub fn fast_fetch_config(download_dir: &Path) -> FetchConfig {
    FetchConfig {
        download_dir: download_dir.to_path_buf(),
        retry_count: 3,
        retry_delay: Duration::from_millis(10),
        retry_jitter: Duration::from_millis(5),
        http_timeout: Duration::from_secs(5),
        ..FetchConfig::default()
    }
}

/// Returns the same text for every image
pub struct FixedTextEngine(pub String);

impl OcrEngine for FixedTextEngine {
    fn name(&self) -> &str {
        "fixed"
    }

    fn recognize(&self, _image_png: &[u8]) -> Result<String, OcrError> {
        Ok(self.0.clone())
    }
}

/// Always fails
pub struct FailingEngine;

impl OcrEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn recognize(&self, _image_png: &[u8]) -> Result<String, OcrError> {
        Err(OcrError::Extraction("engine unavailable".to_string()))
    }
}

/// Panics on every call
pub struct PanickingEngine;

impl OcrEngine for PanickingEngine {
    fn name(&self) -> &str {
        "panicking"
    }

    fn recognize(&self, _image_png: &[u8]) -> Result<String, OcrError> {
        panic!("engine crashed");
    }
}

/// Reads the image width back as a weight, so each image yields a distinct text
pub struct WidthAsWeightEngine;

impl OcrEngine for WidthAsWeightEngine {
    fn name(&self) -> &str {
        "width-as-weight"
    }

    fn recognize(&self, image_png: &[u8]) -> Result<String, OcrError> {
        let decoded = image::load_from_memory(image_png)?;
        Ok(format!("  net weight\n\n {} gram  ", decoded.width()))
    }
}

/// Reports the color type it received
pub struct ColorTypeEngine;

impl OcrEngine for ColorTypeEngine {
    fn name(&self) -> &str {
        "color-type"
    }

    fn recognize(&self, image_png: &[u8]) -> Result<String, OcrError> {
        let decoded = image::load_from_memory(image_png)?;
        Ok(format!("{:?}", decoded.color()))
    }
}

/// Records the highest number of overlapping `recognize` calls
#[derive(Default)]
pub struct ConcurrencyTrackingEngine {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTrackingEngine {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl OcrEngine for ConcurrencyTrackingEngine {
    fn name(&self) -> &str {
        "concurrency-tracking"
    }

    fn recognize(&self, _image_png: &[u8]) -> Result<String, OcrError> {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok("5 gram".to_string())
    }
}
