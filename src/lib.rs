//! # label-measure
//!
//! Reads physical measurements (weight, dimensions, voltage, wattage, volume)
//! off product label photographs. Each input row names an image URL and the
//! attribute to read; the pipeline downloads the image, runs OCR on it and
//! scans the text for a `<number> <unit>` pair allowed for that attribute.

pub mod batch;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod fetcher;
pub mod instance_manager;
pub mod measurement;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod path_validation;
pub mod text_processing;
pub mod units;

// Re-export types for easier access
pub use batch::{BatchOrchestrator, BatchReport, BatchSummary, WorkItem};
pub use errors::{AppError, AppResult};
pub use fetcher::{FetchError, FetchResult, ImageFetcher};
pub use measurement::{ExtractionResult, FailureCode, Measurement};
pub use ocr::{OcrEngine, TextExtractor};
pub use text_processing::MeasurementParser;
pub use units::{Attribute, Unit, UnitVocabulary};
