//! # Measurement and Result Types
//!
//! The per-row output of the pipeline: either a validated [`Measurement`] or one
//! of five [`FailureCode`]s. Failure codes stay inside the crate; at the output
//! boundary every failure collapses to an empty prediction.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use crate::units::{Unit, UnitVocabulary};

lazy_static! {
    // Shape of a formatted prediction: "<number> <unit words>"
    static ref PREDICTION_PATTERN: Regex =
        Regex::new(r"^-?\d+(\.\d+)?\s+[a-zA-Z\s]+$").expect("prediction pattern is valid");
}

/// Largest magnitude still rendered with a fixed ".0" suffix
const INTEGRAL_FORMAT_LIMIT: f64 = 1e15;

/// An immutable value + unit pair
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    value: f64,
    unit: Unit,
}

impl Measurement {
    /// Build a measurement; the value must be finite and non-negative
    pub fn new(value: f64, unit: Unit) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        // Normalize -0.0 so it renders as "0.0"
        let value = if value == 0.0 { 0.0 } else { value };
        Some(Self { value, unit })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_value(self.value), self.unit)
    }
}

/// Render a value as a plain decimal: integral values keep one fractional digit
/// (`5.0`), others use the shortest representation that round-trips (`12.5`).
///
/// Values are `f64`, so numbers beyond 2^53 print as their nearest
/// representable value: `99999999999999999999999` renders as
/// `100000000000000000000000`.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < INTEGRAL_FORMAT_LIMIT {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Why a row produced no measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureCode {
    DownloadFailed,
    TextExtractionFailed,
    InvalidUnit,
    NotFound,
    UnsupportedAttribute,
}

impl FailureCode {
    pub const ALL: [FailureCode; 5] = [
        FailureCode::DownloadFailed,
        FailureCode::TextExtractionFailed,
        FailureCode::InvalidUnit,
        FailureCode::NotFound,
        FailureCode::UnsupportedAttribute,
    ];

    /// Stable snake_case code, used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::DownloadFailed => "download_failed",
            FailureCode::TextExtractionFailed => "text_extraction_failed",
            FailureCode::InvalidUnit => "invalid_unit",
            FailureCode::NotFound => "not_found",
            FailureCode::UnsupportedAttribute => "unsupported_attribute",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one input row
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Found(Measurement),
    Failed(FailureCode),
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Found(_))
    }

    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            ExtractionResult::Found(measurement) => Some(measurement),
            ExtractionResult::Failed(_) => None,
        }
    }

    pub fn failure_code(&self) -> Option<FailureCode> {
        match self {
            ExtractionResult::Found(_) => None,
            ExtractionResult::Failed(code) => Some(*code),
        }
    }

    /// Label for logs and metrics: "success" or the failure code
    pub fn label(&self) -> &'static str {
        match self {
            ExtractionResult::Found(_) => "success",
            ExtractionResult::Failed(code) => code.as_str(),
        }
    }

    /// The output-table form: `"<value> <unit>"`, or empty for any failure
    pub fn prediction(&self) -> String {
        match self {
            ExtractionResult::Found(measurement) => measurement.to_string(),
            ExtractionResult::Failed(_) => String::new(),
        }
    }
}

impl From<FailureCode> for ExtractionResult {
    fn from(code: FailureCode) -> Self {
        ExtractionResult::Failed(code)
    }
}

/// Errors raised while re-reading a formatted prediction
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionError {
    /// The string is not `<number> <unit>`
    InvalidFormat(String),
    /// The unit is not in the vocabulary, even after correction
    InvalidUnit(String),
}

impl fmt::Display for PredictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionError::InvalidFormat(s) => write!(f, "Invalid format in '{}'", s),
            PredictionError::InvalidUnit(unit) => write!(f, "Invalid unit '{}'", unit),
        }
    }
}

impl std::error::Error for PredictionError {}

impl PredictionError {
    /// Both variants mean the unit half of a prediction is unusable
    pub fn failure_code(&self) -> FailureCode {
        FailureCode::InvalidUnit
    }
}

/// Parse a formatted prediction back into a value and a canonical unit.
///
/// An empty (or whitespace-only) string is a valid "no prediction" and yields
/// `Ok(None)`. The unit is spelling-corrected before it is checked against the
/// global vocabulary, so `"2 meter"` reads as `2.0 metre`.
pub fn parse_prediction(
    prediction: &str,
    vocabulary: &UnitVocabulary,
) -> Result<Option<(f64, Unit)>, PredictionError> {
    let stripped = prediction.trim();
    if stripped.is_empty() {
        return Ok(None);
    }
    if !PREDICTION_PATTERN.is_match(stripped) {
        return Err(PredictionError::InvalidFormat(stripped.to_string()));
    }

    let (number, unit) = stripped
        .split_once(char::is_whitespace)
        .ok_or_else(|| PredictionError::InvalidFormat(stripped.to_string()))?;
    let value: f64 = number
        .parse()
        .map_err(|_| PredictionError::InvalidFormat(stripped.to_string()))?;

    let unit = unit.trim();
    let corrected = vocabulary.correct(unit);
    if !vocabulary.contains(&corrected) {
        return Err(PredictionError::InvalidUnit(unit.to_string()));
    }
    let unit = Unit::new(&corrected).map_err(|_| PredictionError::InvalidUnit(unit.to_string()))?;
    Ok(Some((value, unit)))
}
