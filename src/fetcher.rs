//! # Image Fetcher Module
//!
//! Downloads product images into a local directory, one file per URL.
//!
//! ## Features
//!
//! - Deterministic destination: the URL's last path segment, sanitized
//! - Idempotent: an existing destination file is reused without a network call
//! - Fixed-delay retry with optional jitter, bounded by the configured attempt count
//! - Whole-body buffering and atomic writes, so a reader never sees a partial file
//! - Placeholder fallback: when every attempt fails a 100×100 black image is
//!   written instead, so each item always ends with a usable file
//!
//! Two concurrent fetches of the same URL that both miss the existence check
//! race on the destination path; the last atomic rename wins and unrelated
//! files are never touched.

use image::{DynamicImage, ImageFormat, RgbImage};
use rand::Rng;
use std::fmt;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

use crate::config::FetchConfig;
use crate::errors::{error_logging, AppError, AppResult};
use crate::observability;
use crate::path_validation::file_name_from_url;

/// Side length of the synthesized placeholder image
pub const PLACEHOLDER_SIZE: u32 = 100;

/// Outcome of an acquisition: the image on disk or a stand-in for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success(PathBuf),
    Placeholder(PathBuf),
}

impl FetchResult {
    pub fn path(&self) -> &Path {
        match self {
            FetchResult::Success(path) | FetchResult::Placeholder(path) => path,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, FetchResult::Placeholder(_))
    }
}

/// Errors that survive the retry and placeholder fallbacks
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Empty, unparseable or segment-less URL; never retried
    InvalidUrl(String),
    /// A single failed HTTP attempt
    Http(String),
    /// Local file system failure (destination directory, writes)
    Io(String),
    /// Even the placeholder could not be written
    Placeholder(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidUrl(msg) => write!(f, "[INVALID_URL] {}", msg),
            FetchError::Http(msg) => write!(f, "[HTTP] {}", msg),
            FetchError::Io(msg) => write!(f, "[IO] {}", msg),
            FetchError::Placeholder(msg) => {
                write!(f, "[PLACEHOLDER] Failed to write placeholder image: {}", msg)
            }
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err.to_string())
    }
}

/// Running counters for one fetcher
#[derive(Debug, Default)]
pub struct FetchStats {
    attempts: AtomicU64,
    downloads: AtomicU64,
    reuses: AtomicU64,
    placeholders: AtomicU64,
    invalid_urls: AtomicU64,
}

/// Point-in-time copy of [`FetchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStatsSnapshot {
    /// Network requests issued
    pub attempts: u64,
    /// Images written from a successful response
    pub downloads: u64,
    /// Fetches answered by an existing file
    pub reuses: u64,
    /// Placeholders written after exhausting the attempts
    pub placeholders: u64,
    /// URLs rejected before any request
    pub invalid_urls: u64,
}

impl FetchStats {
    pub fn snapshot(&self) -> FetchStatsSnapshot {
        FetchStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            placeholders: self.placeholders.load(Ordering::Relaxed),
            invalid_urls: self.invalid_urls.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Downloads images with retry and placeholder fallback
#[derive(Debug)]
pub struct ImageFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    stats: FetchStats,
}

impl ImageFetcher {
    /// Build a fetcher with its own HTTP client
    pub fn new(config: FetchConfig) -> AppResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            stats: FetchStats::default(),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn stats(&self) -> FetchStatsSnapshot {
        self.stats.snapshot()
    }

    /// The path `url` is stored under inside `dest_dir`
    pub fn destination_path(url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        let file_name = file_name_from_url(url)
            .map_err(|e| FetchError::InvalidUrl(format!("'{}': {}", url, e)))?;
        Ok(dest_dir.join(file_name))
    }

    /// Acquire the image at `url` into `dest_dir`.
    ///
    /// Only an invalid URL, an unusable destination directory or a failed
    /// placeholder write produce an error; network failures end in
    /// [`FetchResult::Placeholder`].
    pub async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchResult, FetchError> {
        let span = observability::fetch_span(url);
        self.fetch_inner(url, dest_dir).instrument(span).await
    }

    async fn fetch_inner(&self, url: &str, dest_dir: &Path) -> Result<FetchResult, FetchError> {
        let start = Instant::now();

        let dest = match Self::destination_path(url, dest_dir) {
            Ok(dest) => dest,
            Err(e) => {
                FetchStats::bump(&self.stats.invalid_urls);
                observability::record_fetch_outcome("invalid_url", start.elapsed());
                warn!(url = %url, error = %e, "Rejected image URL");
                return Err(e);
            }
        };

        if dest.is_file() {
            FetchStats::bump(&self.stats.reuses);
            observability::record_fetch_outcome("reused", start.elapsed());
            debug!(path = %dest.display(), "Reusing existing image");
            return Ok(FetchResult::Success(dest));
        }

        if let Err(e) = std::fs::create_dir_all(dest_dir) {
            error_logging::log_filesystem_error(
                &e,
                "create_download_dir",
                Some(&dest_dir.display().to_string()),
                None,
            );
            observability::record_fetch_outcome("io_error", start.elapsed());
            return Err(FetchError::Io(format!("{}: {}", dest_dir.display(), e)));
        }

        let attempts = self.config.retry_count.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            FetchStats::bump(&self.stats.attempts);
            observability::record_fetch_attempt();

            let outcome = match self.download_once(url).await {
                Ok(bytes) => write_atomic(&dest, &bytes).map(|_| bytes.len()).map_err(FetchError::from),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(size) => {
                    FetchStats::bump(&self.stats.downloads);
                    observability::record_fetch_outcome("downloaded", start.elapsed());
                    info!(
                        url = %url,
                        path = %dest.display(),
                        bytes = size,
                        attempt,
                        "Image downloaded"
                    );
                    return Ok(FetchResult::Success(dest));
                }
                Err(e) => {
                    warn!(url = %url, attempt, max_attempts = attempts, error = %e, "Download attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                let delay = self.retry_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Waiting before retry");
                tokio::time::sleep(delay).await;
            }
        }

        if let Some(e) = &last_error {
            error_logging::log_network_error(e, "fetch_image", Some(url), Some(attempts));
        }

        match write_placeholder(&dest) {
            Ok(()) => {
                FetchStats::bump(&self.stats.placeholders);
                observability::record_fetch_outcome("placeholder", start.elapsed());
                warn!(url = %url, path = %dest.display(), "Using placeholder image");
                Ok(FetchResult::Placeholder(dest))
            }
            Err(e) => {
                error_logging::log_filesystem_error(
                    &e,
                    "write_placeholder",
                    Some(&dest.display().to_string()),
                    None,
                );
                observability::record_fetch_outcome("placeholder_failed", start.elapsed());
                Err(e)
            }
        }
    }

    /// One full GET with the body buffered in memory
    async fn download_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let max = self.config.max_image_bytes;
        if let Some(content_length) = response.content_length() {
            if content_length > max {
                return Err(FetchError::Http(format!(
                    "Image too large: {} bytes (maximum allowed: {} bytes)",
                    content_length, max
                )));
            }
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::Http("Empty response body".to_string()));
        }
        if bytes.len() as u64 > max {
            return Err(FetchError::Http(format!(
                "Image too large: {} bytes (maximum allowed: {} bytes)",
                bytes.len(),
                max
            )));
        }
        Ok(bytes.to_vec())
    }

    /// Fixed delay plus uniform jitter in `[0, retry_jitter]`
    fn retry_delay(&self) -> Duration {
        let jitter_ms = self.config.retry_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.config.retry_delay + Duration::from_millis(jitter)
    }
}

/// Write `bytes` to `dest` through a temporary file in the same directory
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Encode the black placeholder in the format implied by `dest`'s extension,
/// PNG when the extension is unknown or not encodable
pub fn placeholder_bytes(dest: &Path) -> Result<Vec<u8>, FetchError> {
    let placeholder = DynamicImage::ImageRgb8(RgbImage::new(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));

    if let Ok(format) = ImageFormat::from_path(dest) {
        if format != ImageFormat::Png && format.writing_enabled() {
            let mut buffer = Cursor::new(Vec::new());
            if placeholder.write_to(&mut buffer, format).is_ok() {
                return Ok(buffer.into_inner());
            }
            debug!(?format, "Placeholder format not encodable, using PNG");
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    placeholder
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| FetchError::Placeholder(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Synthesize the placeholder and write it atomically to `dest`
pub fn write_placeholder(dest: &Path) -> Result<(), FetchError> {
    let bytes = placeholder_bytes(dest)?;
    write_atomic(dest, &bytes)
        .map_err(|e| FetchError::Placeholder(format!("{}: {}", dest.display(), e)))
}
