//! # Dataset Module
//!
//! CSV adapter for the input and output tables.
//!
//! Input columns: `row_id` (or `index`), `image_link`, `attribute_name`
//! (or `entity_name`). Other columns are ignored. The output table has one
//! `row_id,prediction` line per input row, in input order; a failed row has
//! an empty prediction.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::batch::WorkItem;
use crate::errors::{AppError, AppResult};
use crate::measurement::ExtractionResult;

/// One row of the input table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputRow {
    #[serde(alias = "index")]
    pub row_id: String,
    pub image_link: String,
    #[serde(alias = "entity_name")]
    pub attribute_name: String,
}

impl InputRow {
    pub fn work_item(&self) -> WorkItem {
        WorkItem::new(self.image_link.clone(), self.attribute_name.clone())
    }
}

/// One row of the output table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub row_id: String,
    pub prediction: String,
}

/// Read every input row, failing on the first malformed line
pub fn read_rows(path: &Path) -> AppResult<Vec<InputRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::Dataset(format!("cannot open '{}': {}", path.display(), e)))?;

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<InputRow>, csv::Error>>()
        .map_err(|e| AppError::Dataset(format!("'{}': {}", path.display(), e)))?;

    info!(path = %path.display(), rows = rows.len(), "Loaded input table");
    Ok(rows)
}

/// Pair input rows with their results; both slices are in input order
pub fn output_rows(rows: &[InputRow], results: &[ExtractionResult]) -> AppResult<Vec<OutputRow>> {
    if rows.len() != results.len() {
        return Err(AppError::Internal(format!(
            "{} results for {} input rows",
            results.len(),
            rows.len()
        )));
    }
    Ok(rows
        .iter()
        .zip(results)
        .map(|(row, result)| OutputRow {
            row_id: row.row_id.clone(),
            prediction: result.prediction(),
        })
        .collect())
}

/// Write the output table, creating the parent directory if needed
pub fn write_predictions(path: &Path, rows: &[OutputRow]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Wrote predictions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{FailureCode, Measurement};
    use crate::units::Unit;

    #[test]
    fn test_output_rows_collapse_failures() {
        let rows = vec![
            InputRow {
                row_id: "0".to_string(),
                image_link: "https://example.com/a.jpg".to_string(),
                attribute_name: "item_weight".to_string(),
            },
            InputRow {
                row_id: "1".to_string(),
                image_link: "https://example.com/b.jpg".to_string(),
                attribute_name: "voltage".to_string(),
            },
        ];
        let unit = Unit::new("gram").expect("valid unit");
        let results = vec![
            ExtractionResult::Found(Measurement::new(500.0, unit).expect("valid")),
            ExtractionResult::Failed(FailureCode::NotFound),
        ];

        let output = output_rows(&rows, &results).expect("same length");
        assert_eq!(output[0].prediction, "500.0 gram");
        assert_eq!(output[1].prediction, "");
        assert_eq!(output[1].row_id, "1");

        assert!(output_rows(&rows, &results[..1]).is_err());
    }
}
