//! # OCR Processing Module
//!
//! The text extraction stage: image file in, normalized text out.
//!
//! ## Features
//!
//! - Engine-agnostic: any [`OcrEngine`] can back the extractor (Tesseract in
//!   production, fakes in tests)
//! - Image validation before decoding (exists, regular file, non-empty, size limit)
//! - Format detection from content, not from the file extension
//! - Single-channel grayscale conversion before recognition
//! - Never fails: any error is logged and becomes empty text, so one corrupt
//!   image cannot interrupt a batch
//!
//! ## Dependencies
//!
//! - `image`: decoding, grayscale conversion and PNG re-encoding
//! - `leptess`: Tesseract bindings, see [`crate::instance_manager`]

use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::error_logging;
use crate::observability;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;

/// A black-box OCR engine: encoded image bytes in, raw text out
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &str;

    /// Recognize text in a PNG-encoded image
    fn recognize(&self, image_png: &[u8]) -> Result<String, OcrError>;
}

/// Validate an image file and return its size in bytes
pub fn validate_image_path(image_path: &Path, max_file_size: u64) -> Result<u64, OcrError> {
    if !image_path.exists() {
        return Err(OcrError::Validation(format!(
            "file does not exist ({})",
            image_path.display()
        )));
    }

    if !image_path.is_file() {
        return Err(OcrError::Validation(format!(
            "path is not a file ({})",
            image_path.display()
        )));
    }

    let file_size = image_path
        .metadata()
        .map_err(|e| {
            OcrError::Validation(format!(
                "cannot read file metadata ({}) - {}",
                image_path.display(),
                e
            ))
        })?
        .len();

    if file_size == 0 {
        return Err(OcrError::Validation(format!(
            "file is empty ({})",
            image_path.display()
        )));
    }
    if file_size > max_file_size {
        return Err(OcrError::Validation(format!(
            "file too large ({} bytes, maximum allowed: {} bytes)",
            file_size, max_file_size
        )));
    }

    Ok(file_size)
}

/// Decode an image, convert it to 8-bit grayscale and re-encode it as PNG
pub fn to_grayscale_png(image_path: &Path) -> Result<Vec<u8>, OcrError> {
    let decoded = ImageReader::open(image_path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| OcrError::ImageLoad(format!("{}: {}", image_path.display(), e)))?
        .decode()?;

    let gray = DynamicImage::ImageLuma8(decoded.to_luma8());
    let mut buffer = Cursor::new(Vec::new());
    gray.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Clean up OCR output: trim the text and each line, drop blank lines
pub fn normalize_text(raw: &str) -> String {
    raw.trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Wraps an [`OcrEngine`] with validation, grayscale conversion and normalization
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
    max_file_size: u64,
}

impl std::fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field("engine", &self.engine.name())
            .field("max_file_size", &self.max_file_size)
            .finish()
    }
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &OcrConfig) -> Self {
        Self {
            engine,
            max_file_size: config.max_file_size,
        }
    }

    /// Extract normalized text from an image file.
    ///
    /// Returns an empty string on any failure; the error is logged and counted.
    pub fn extract(&self, image_path: &Path) -> String {
        let span = observability::ocr_span("extract");
        let _enter = span.enter();

        let start = Instant::now();
        match self.try_extract(image_path) {
            Ok((text, image_size)) => {
                let duration = start.elapsed();
                observability::record_ocr_metrics(true, duration, image_size);
                info!(
                    path = %image_path.display(),
                    engine = self.engine.name(),
                    chars = text.len(),
                    duration_ms = duration.as_millis() as u64,
                    "OCR extraction completed"
                );
                text
            }
            Err(err) => {
                let duration = start.elapsed();
                observability::record_ocr_metrics(false, duration, 0);
                error_logging::log_ocr_error(
                    &err,
                    "extract_text",
                    Some(&image_path.display().to_string()),
                    image_path.metadata().ok().map(|m| m.len()),
                    Some(duration),
                );
                String::new()
            }
        }
    }

    /// Extract text, reporting failures. Returns the text and the image size.
    pub fn try_extract(&self, image_path: &Path) -> Result<(String, u64), OcrError> {
        let image_size = validate_image_path(image_path, self.max_file_size)?;
        let grayscale = to_grayscale_png(image_path)?;
        debug!(
            path = %image_path.display(),
            encoded_bytes = grayscale.len(),
            "Converted image to grayscale"
        );

        let ocr_start = Instant::now();
        let raw = self.engine.recognize(&grayscale)?;
        let ocr_duration = ocr_start.elapsed();
        if ocr_duration > Duration::from_secs(10) {
            warn!(
                path = %image_path.display(),
                duration_ms = ocr_duration.as_millis() as u64,
                "Slow OCR recognition"
            );
        }

        Ok((normalize_text(&raw), image_size))
    }
}
