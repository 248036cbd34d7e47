//! # OCR Error Types Module
//!
//! Error type for the text extraction stage. These errors never leave
//! [`crate::ocr::TextExtractor::extract`]; they are logged and turned into
//! empty text there.

/// Custom error types for OCR operations
#[derive(Debug, Clone, PartialEq)]
pub enum OcrError {
    /// File validation errors (missing, empty, oversized)
    Validation(String),
    /// OCR engine initialization errors
    Initialization(String),
    /// Image loading or decoding errors
    ImageLoad(String),
    /// Text extraction errors reported by the engine
    Extraction(String),
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::Validation(msg) => write!(f, "[VALIDATION] Image validation failed: {}", msg),
            OcrError::Initialization(msg) => {
                write!(f, "[OCR_INIT] OCR engine initialization failed: {}", msg)
            }
            OcrError::ImageLoad(msg) => {
                write!(f, "[IMAGE_LOAD] Failed to load image for OCR processing: {}", msg)
            }
            OcrError::Extraction(msg) => {
                write!(f, "[OCR_EXTRACT] Text extraction from image failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for OcrError {}

impl From<anyhow::Error> for OcrError {
    fn from(err: anyhow::Error) -> Self {
        OcrError::Extraction(err.to_string())
    }
}

impl From<image::ImageError> for OcrError {
    fn from(err: image::ImageError) -> Self {
        OcrError::ImageLoad(err.to_string())
    }
}
