//! # Text Processing Module
//!
//! Turns OCR text into a [`Measurement`] for a requested attribute.
//!
//! ## Features
//!
//! - One compiled regex per (attribute, unit), built once from the vocabulary
//! - Units matched as whole tokens: `foot` never matches inside `football`
//! - Common misspellings recognized and corrected (`meter`, `feet`)
//! - Declaration order of the vocabulary decides between several units on one label
//!
//! ## Pattern Structure
//!
//! ```regex
//! (?i)(?P<value>[-+]?\d+(?:\.\d+)?)\s*(?P<unit>metre|meter)\b
//! ```
//!
//! Multi-word units (`fluid ounce`) accept any run of whitespace between words.
//! Scientific notation is not recognized, and a number glued to a preceding
//! word character, `.` or `,` is a fragment (`1e3`, `1,500`) and never matches.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::measurement::{ExtractionResult, FailureCode, Measurement};
use crate::units::{Attribute, Unit, UnitVocabulary};

const VALUE_PATTERN: &str = r"[-+]?\d+(?:\.\d+)?";

/// A compiled search pattern for one allowed unit
#[derive(Debug, Clone)]
struct UnitPattern {
    unit: Unit,
    regex: Regex,
}

/// Build the search pattern for one unit from its accepted spellings
pub fn build_unit_pattern(spellings: &[String]) -> String {
    let alternation = spellings
        .iter()
        .map(|spelling| {
            spelling
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");
    format!(r"(?i)(?P<value>{VALUE_PATTERN})\s*(?P<unit>{alternation})\b")
}

/// Scans OCR text for the first `<number> <unit>` pair valid for an attribute
#[derive(Debug, Clone)]
pub struct MeasurementParser {
    vocabulary: Arc<UnitVocabulary>,
    patterns: BTreeMap<Attribute, Vec<UnitPattern>>,
}

impl MeasurementParser {
    /// Compile the patterns for every attribute in the vocabulary
    pub fn new(vocabulary: Arc<UnitVocabulary>) -> Result<Self, regex::Error> {
        let mut patterns = BTreeMap::new();
        for attribute in Attribute::ALL {
            let compiled = vocabulary
                .allowed_units(attribute)
                .iter()
                .map(|unit| {
                    let pattern = build_unit_pattern(&vocabulary.spellings(unit));
                    trace!(attribute = %attribute, unit = %unit, pattern = %pattern, "Compiled unit pattern");
                    Regex::new(&pattern).map(|regex| UnitPattern {
                        unit: unit.clone(),
                        regex,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            patterns.insert(attribute, compiled);
        }
        Ok(Self {
            vocabulary,
            patterns,
        })
    }

    pub fn vocabulary(&self) -> &Arc<UnitVocabulary> {
        &self.vocabulary
    }

    /// Parse `text` for the attribute named `attribute`.
    ///
    /// Returns `unsupported_attribute` for an unknown attribute tag regardless of
    /// the text, and `not_found` when no valid `<number> <unit>` pair exists.
    pub fn parse(&self, text: &str, attribute: &str) -> ExtractionResult {
        match attribute.parse::<Attribute>() {
            Ok(attribute) => self.parse_attribute(text, attribute),
            Err(_) => {
                debug!(attribute = %attribute, "Unsupported attribute");
                ExtractionResult::Failed(FailureCode::UnsupportedAttribute)
            }
        }
    }

    /// Parse `text` for an already-validated attribute
    pub fn parse_attribute(&self, text: &str, attribute: Attribute) -> ExtractionResult {
        let lowered = text.to_lowercase();
        let Some(patterns) = self.patterns.get(&attribute) else {
            return ExtractionResult::Failed(FailureCode::UnsupportedAttribute);
        };

        for pattern in patterns {
            for captures in pattern.regex.captures_iter(&lowered) {
                let (Some(value_match), Some(unit_match)) =
                    (captures.name("value"), captures.name("unit"))
                else {
                    continue;
                };

                let Some(value) = parse_value(&lowered, value_match.start(), value_match.as_str())
                else {
                    continue;
                };

                let matched_unit = unit_match.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
                let Some(unit) = self.vocabulary.resolve(attribute, &matched_unit) else {
                    debug!(
                        attribute = %attribute,
                        candidate = %matched_unit,
                        "Matched unit rejected after correction"
                    );
                    continue;
                };

                match Measurement::new(value, unit) {
                    Some(measurement) => {
                        debug!(
                            attribute = %attribute,
                            expected_unit = %pattern.unit,
                            measurement = %measurement,
                            "Measurement found"
                        );
                        return ExtractionResult::Found(measurement);
                    }
                    None => {
                        debug!(attribute = %attribute, value, "Matched value rejected");
                    }
                }
            }
        }

        ExtractionResult::Failed(FailureCode::NotFound)
    }
}

/// Parse a matched number. A `-` glued to a preceding word or digit is a range
/// or part-number separator (`100-240 volt`), not a sign. An unsigned number
/// glued to the token before it (`1e3`, `1,500`) is rejected.
fn parse_value(text: &str, start: usize, raw: &str) -> Option<f64> {
    let previous = text[..start].chars().next_back();
    let glued = previous.is_some_and(char::is_alphanumeric);
    let raw = match raw.strip_prefix('-') {
        Some(unsigned) if glued => unsigned,
        _ if raw.starts_with(|c: char| c.is_ascii_digit())
            && previous.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | ',')) =>
        {
            return None;
        }
        _ => raw,
    };
    raw.parse::<f64>().ok()
}
