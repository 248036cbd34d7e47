//! # Unified Application Configuration
//!
//! This module consolidates every setting of a batch run into one structured
//! configuration object. It supports loading from environment variables,
//! validation, and a redacted summary for logging.

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::{OcrConfig, MAX_FILE_SIZE};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Image acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Directory the images are written to
    pub download_dir: PathBuf,
    /// Total number of network attempts per image (at least 1)
    pub retry_count: u32,
    /// Fixed delay between two attempts
    pub retry_delay: Duration,
    /// Upper bound of the random extra delay added to `retry_delay`
    pub retry_jitter: Duration,
    /// HTTP client timeout
    pub http_timeout: Duration,
    /// Largest accepted response body in bytes
    pub max_image_bytes: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("images"),
            retry_count: 3,
            retry_delay: Duration::from_millis(3000),
            retry_jitter: Duration::ZERO,
            http_timeout: Duration::from_secs(30),
            max_image_bytes: MAX_FILE_SIZE,
            user_agent: format!("label-measure/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    /// Validate fetch configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.download_dir.as_os_str().is_empty() {
            return Err(AppError::Config(
                "Download directory cannot be empty".to_string(),
            ));
        }

        if self.retry_count == 0 {
            return Err(AppError::Config(
                "Retry count must be at least 1".to_string(),
            ));
        }

        if self.http_timeout.is_zero() {
            return Err(AppError::Config("HTTP timeout cannot be 0".to_string()));
        }

        if self.http_timeout > Duration::from_secs(300) {
            return Err(AppError::Config(
                "HTTP timeout cannot be greater than 300 seconds".to_string(),
            ));
        }

        if self.max_image_bytes == 0 {
            return Err(AppError::Config(
                "Maximum image size cannot be 0".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(AppError::Config("User agent cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of items processed concurrently
    pub worker_count: usize,
    /// Keep downloaded images after their item finishes
    pub retain_images: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 64,
            retain_images: true,
        }
    }
}

impl BatchConfig {
    /// Validate batch configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.worker_count == 0 {
            return Err(AppError::Config("Worker count cannot be 0".to_string()));
        }

        if self.worker_count > 1024 {
            return Err(AppError::Config(
                "Worker count cannot be greater than 1024".to_string(),
            ));
        }

        Ok(())
    }
}

/// Input and output table locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("dataset/test.csv"),
            output_path: PathBuf::from("dataset/test_out.csv"),
        }
    }
}

impl DatasetConfig {
    /// Validate dataset configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.input_path.as_os_str().is_empty() {
            return Err(AppError::Config("Input path cannot be empty".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(AppError::Config("Output path cannot be empty".to_string()));
        }
        if self.input_path == self.output_path {
            return Err(AppError::Config(
                "Input and output paths cannot be the same".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Image acquisition configuration
    pub fetch: FetchConfig,
    /// Worker pool configuration
    pub batch: BatchConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Table locations
    pub dataset: DatasetConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
    /// Optional unit vocabulary override file
    pub vocabulary_path: Option<PathBuf>,
}

/// Read and parse an environment variable, using `default` when it is unset
fn env_or<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid value, got '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Dataset
        if let Some(path) = env_path("INPUT_PATH") {
            config.dataset.input_path = path;
        }
        if let Some(path) = env_path("OUTPUT_PATH") {
            config.dataset.output_path = path;
        }

        // Fetch
        if let Some(path) = env_path("DOWNLOAD_DIR") {
            config.fetch.download_dir = path;
        }
        config.fetch.retry_count = env_or("FETCH_RETRY_COUNT", config.fetch.retry_count)?;
        config.fetch.retry_delay = Duration::from_millis(env_or(
            "FETCH_RETRY_DELAY_MS",
            config.fetch.retry_delay.as_millis() as u64,
        )?);
        config.fetch.retry_jitter = Duration::from_millis(env_or(
            "FETCH_RETRY_JITTER_MS",
            config.fetch.retry_jitter.as_millis() as u64,
        )?);
        config.fetch.http_timeout = Duration::from_secs(env_or(
            "HTTP_CLIENT_TIMEOUT_SECS",
            config.fetch.http_timeout.as_secs(),
        )?);
        config.fetch.max_image_bytes = env_or("MAX_IMAGE_BYTES", config.fetch.max_image_bytes)?;

        // Batch
        config.batch.worker_count = env_or("WORKER_COUNT", config.batch.worker_count)?;
        config.batch.retain_images = env_or("RETAIN_IMAGES", config.batch.retain_images)?;

        // OCR shares the image size limit with the fetcher
        config.ocr.max_file_size = config.fetch.max_image_bytes;
        if let Ok(languages) = env::var("OCR_LANGUAGES") {
            config.ocr.languages = languages.trim().to_string();
        }
        config.ocr.psm_mode = env_or("OCR_PSM", config.ocr.psm_mode)?;
        config.ocr.model_type = env_or("OCR_MODEL", config.ocr.model_type)?;
        config.ocr.tessdata_path = env::var("TESSDATA_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty());

        config.vocabulary_path = env_path("UNIT_VOCABULARY_PATH");
        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.fetch.validate()?;
        self.batch.validate()?;
        self.ocr.validate()?;
        self.dataset.validate()?;
        self.observability.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: input={}, output={}, download_dir={}, workers={}, retry_count={}, retry_delay_ms={}, ocr_languages={}, ocr_psm={}, ocr_model={}, retain_images={}, metrics_enabled={}",
            self.dataset.input_path.display(),
            self.dataset.output_path.display(),
            self.fetch.download_dir.display(),
            self.batch.worker_count,
            self.fetch.retry_count,
            self.fetch.retry_delay.as_millis(),
            self.ocr.languages,
            self.ocr.psm_mode.as_str(),
            self.ocr.model_type.tessdata_dir(),
            self.batch.retain_images,
            self.observability.enable_metrics
        )
    }
}
