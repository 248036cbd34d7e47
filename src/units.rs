//! # Unit Vocabulary Module
//!
//! The controlled vocabulary of measurement units, scoped per attribute.
//!
//! ## Features
//!
//! - Closed [`Attribute`] set with case-insensitive parsing
//! - Ordered allowed-unit lists (declaration order is the tie-break when a label
//!   mentions several units)
//! - Deterministic spelling correction (`meter` → `metre`, `feet` → `foot`)
//! - Optional JSON override of the built-in tables, validated on load
//!
//! A vocabulary is immutable once built. Workers share it behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

const LENGTH_UNITS: &[&str] = &["centimetre", "foot", "millimetre", "metre", "inch", "yard"];

const WEIGHT_UNITS: &[&str] = &[
    "milligram",
    "kilogram",
    "microgram",
    "gram",
    "ounce",
    "ton",
    "pound",
];

const VOLTAGE_UNITS: &[&str] = &["millivolt", "kilovolt", "volt"];

const WATTAGE_UNITS: &[&str] = &["kilowatt", "watt"];

const VOLUME_UNITS: &[&str] = &[
    "cubic foot",
    "microlitre",
    "cup",
    "fluid ounce",
    "centilitre",
    "imperial gallon",
    "pint",
    "decilitre",
    "litre",
    "millilitre",
    "quart",
    "cubic inch",
    "gallon",
];

/// Spelling-correction rules, tried in order after the identity rule.
/// Each pair is (misspelled fragment, canonical fragment).
pub const CORRECTION_RULES: &[(&str, &str)] = &[("ter", "tre"), ("feet", "foot")];

/// The physical quantity a row asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Width,
    Depth,
    Height,
    ItemWeight,
    MaximumWeightRecommendation,
    Voltage,
    Wattage,
    ItemVolume,
}

impl Attribute {
    /// Every supported attribute, in table order
    pub const ALL: [Attribute; 8] = [
        Attribute::Width,
        Attribute::Depth,
        Attribute::Height,
        Attribute::ItemWeight,
        Attribute::MaximumWeightRecommendation,
        Attribute::Voltage,
        Attribute::Wattage,
        Attribute::ItemVolume,
    ];

    /// The tag used in input tables and vocabulary files
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Width => "width",
            Attribute::Depth => "depth",
            Attribute::Height => "height",
            Attribute::ItemWeight => "item_weight",
            Attribute::MaximumWeightRecommendation => "maximum_weight_recommendation",
            Attribute::Voltage => "voltage",
            Attribute::Wattage => "wattage",
            Attribute::ItemVolume => "item_volume",
        }
    }

    fn builtin_units(&self) -> &'static [&'static str] {
        match self {
            Attribute::Width | Attribute::Depth | Attribute::Height => LENGTH_UNITS,
            Attribute::ItemWeight | Attribute::MaximumWeightRecommendation => WEIGHT_UNITS,
            Attribute::Voltage => VOLTAGE_UNITS,
            Attribute::Wattage => WATTAGE_UNITS,
            Attribute::ItemVolume => VOLUME_UNITS,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Attribute::ALL
            .iter()
            .copied()
            .find(|attribute| attribute.as_str() == normalized)
            .ok_or_else(|| AppError::Validation(format!("unsupported attribute '{}'", s)))
    }
}

/// A canonical lowercase unit name, e.g. `centimetre` or `fluid ounce`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unit(String);

impl Unit {
    /// Build a unit, rejecting empty, non-lowercase or control-character names
    pub fn new(name: &str) -> AppResult<Self> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("unit name cannot be empty".to_string()));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(AppError::Validation(format!(
                "unit '{}' contains control characters",
                name.escape_debug()
            )));
        }
        if name != name.to_lowercase() || name != name.trim() {
            return Err(AppError::Validation(format!(
                "unit '{}' must be lowercase without surrounding whitespace",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk shape of a vocabulary override file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VocabularyFile {
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Immutable registry of allowed units per attribute
#[derive(Debug, Clone, PartialEq)]
pub struct UnitVocabulary {
    by_attribute: BTreeMap<Attribute, Vec<Unit>>,
    all_units: BTreeSet<String>,
}

impl UnitVocabulary {
    /// The built-in tables
    pub fn builtin() -> Self {
        let by_attribute = Attribute::ALL
            .iter()
            .map(|attribute| {
                let units = attribute
                    .builtin_units()
                    .iter()
                    .map(|name| Unit((*name).to_string()))
                    .collect();
                (*attribute, units)
            })
            .collect();
        Self::from_tables(by_attribute)
    }

    fn from_tables(by_attribute: BTreeMap<Attribute, Vec<Unit>>) -> Self {
        let all_units = by_attribute
            .values()
            .flatten()
            .map(|unit| unit.as_str().to_string())
            .collect();
        Self {
            by_attribute,
            all_units,
        }
    }

    /// Parse and validate a JSON vocabulary (`{"attributes": {"width": [...], ...}}`)
    pub fn from_json_str(content: &str) -> AppResult<Self> {
        let file: VocabularyFile = serde_json::from_str(content)
            .map_err(|e| AppError::Validation(format!("invalid vocabulary JSON: {}", e)))?;

        let mut by_attribute = BTreeMap::new();
        for (name, units) in &file.attributes {
            let attribute: Attribute = name.parse()?;
            let units = units
                .iter()
                .map(|unit| Unit::new(unit))
                .collect::<AppResult<Vec<_>>>()?;
            if by_attribute.insert(attribute, units).is_some() {
                return Err(AppError::Validation(format!(
                    "attribute '{}' is listed more than once",
                    attribute
                )));
            }
        }

        let vocabulary = Self::from_tables(by_attribute);
        vocabulary.validate()?;
        Ok(vocabulary)
    }

    /// Load a vocabulary override from a JSON file
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::FileSystem(format!(
                "cannot read unit vocabulary '{}': {}",
                path.display(),
                e
            ))
        })?;
        let vocabulary = Self::from_json_str(&content)?;
        info!(
            path = %path.display(),
            units = vocabulary.all_units.len(),
            "Loaded unit vocabulary"
        );
        Ok(vocabulary)
    }

    /// Check that every attribute maps to a non-empty, duplicate-free unit list
    pub fn validate(&self) -> AppResult<()> {
        for attribute in Attribute::ALL {
            let units = self.allowed_units(attribute);
            if units.is_empty() {
                return Err(AppError::Validation(format!(
                    "attribute '{}' has no allowed units",
                    attribute
                )));
            }
            let mut seen = BTreeSet::new();
            for unit in units {
                if !seen.insert(unit.as_str()) {
                    return Err(AppError::Validation(format!(
                        "unit '{}' is listed twice for attribute '{}'",
                        unit, attribute
                    )));
                }
            }
        }
        Ok(())
    }

    /// Allowed units for an attribute, in declaration order
    pub fn allowed_units(&self, attribute: Attribute) -> &[Unit] {
        self.by_attribute
            .get(&attribute)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `unit` belongs to the global allowed-unit superset
    pub fn contains(&self, unit: &str) -> bool {
        self.all_units.contains(unit)
    }

    /// Whether `unit` is allowed for `attribute`
    pub fn is_allowed(&self, attribute: Attribute, unit: &str) -> bool {
        self.allowed_units(attribute)
            .iter()
            .any(|allowed| allowed.as_str() == unit)
    }

    /// Correct common spelling mistakes.
    ///
    /// Tries the identity, then each rule of [`CORRECTION_RULES`] applied to the
    /// original candidate, and returns the first spelling found in the global
    /// vocabulary. When nothing matches the candidate comes back unchanged; deciding
    /// whether it is acceptable is the caller's job.
    pub fn correct<'a>(&self, candidate: &'a str) -> Cow<'a, str> {
        if self.contains(candidate) {
            return Cow::Borrowed(candidate);
        }
        for (wrong, right) in CORRECTION_RULES {
            if !candidate.contains(wrong) {
                continue;
            }
            let rewritten = candidate.replace(wrong, right);
            if self.contains(&rewritten) {
                debug!(candidate = %candidate, corrected = %rewritten, "Corrected unit spelling");
                return Cow::Owned(rewritten);
            }
        }
        Cow::Borrowed(candidate)
    }

    /// Correct `candidate` and return the unit if it is allowed for `attribute`
    pub fn resolve(&self, attribute: Attribute, candidate: &str) -> Option<Unit> {
        let corrected = self.correct(candidate);
        self.allowed_units(attribute)
            .iter()
            .find(|unit| unit.as_str() == corrected.as_ref())
            .cloned()
    }

    /// The spellings worth searching for: the canonical name first, then each
    /// misspelling that [`UnitVocabulary::correct`] maps back to it
    pub fn spellings(&self, unit: &Unit) -> Vec<String> {
        let mut spellings = vec![unit.as_str().to_string()];
        for (wrong, right) in CORRECTION_RULES {
            if !unit.as_str().contains(right) {
                continue;
            }
            let misspelled = unit.as_str().replace(right, wrong);
            if !spellings.contains(&misspelled)
                && !self.contains(&misspelled)
                && self.correct(&misspelled) == unit.as_str()
            {
                spellings.push(misspelled);
            }
        }
        spellings
    }
}

impl Default for UnitVocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}
