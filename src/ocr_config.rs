//! # OCR Configuration Module
//!
//! Configuration for the Tesseract engine behind the text extraction stage.

use std::str::FromStr;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_LANGUAGES: &str = "eng";
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit for image files

/// Characters found on product labels: digits, letters, decimal marks and unit punctuation
pub const LABEL_CHARACTER_WHITELIST: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz.,-:/()%\" ";

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    #[default]
    Auto,
    /// Assume a single uniform block of text
    SingleBlock,
    /// Treat the image as a single text line
    SingleLine,
    /// Find as much text as possible in no particular order
    SparseText,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SparseText => "11",
        }
    }

}

/// Accepts the names used in configuration (`auto`, `single_block`, ...) or the
/// Tesseract PSM number
impl FromStr for PageSegMode {
    type Err = AppError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "auto" | "3" => Ok(PageSegMode::Auto),
            "single_block" | "6" => Ok(PageSegMode::SingleBlock),
            "single_line" | "7" => Ok(PageSegMode::SingleLine),
            "sparse_text" | "11" => Ok(PageSegMode::SparseText),
            other => Err(AppError::Config(format!(
                "unknown page segmentation mode '{}'",
                other
            ))),
        }
    }
}

/// Tesseract model type
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - quicker processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }
}

impl FromStr for ModelType {
    type Err = AppError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "fast" => Ok(ModelType::Fast),
            "best" => Ok(ModelType::Best),
            other => Err(AppError::Config(format!(
                "unknown model type '{}' (expected 'fast' or 'best')",
                other
            ))),
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "eng", "eng+fra")
    pub languages: String,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
    /// Explicit tessdata directory; well-known locations are searched when unset
    pub tessdata_path: Option<String>,
    /// Maximum allowed image file size in bytes
    pub max_file_size: u64,
    /// Page segmentation mode for OCR
    pub psm_mode: PageSegMode,
    /// Character whitelist to restrict OCR output to label-relevant characters
    pub character_whitelist: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            model_type: ModelType::default(),
            tessdata_path: None,
            max_file_size: MAX_FILE_SIZE,
            psm_mode: PageSegMode::SparseText,
            character_whitelist: Some(LABEL_CHARACTER_WHITELIST.to_string()),
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(AppError::Config("languages cannot be empty".to_string()));
        }
        if self
            .languages
            .split('+')
            .any(|code| code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(AppError::Config(format!(
                "languages '{}' must be '+'-separated Tesseract codes",
                self.languages
            )));
        }
        if self.max_file_size == 0 {
            return Err(AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if let Some(path) = &self.tessdata_path {
            if path.trim().is_empty() {
                return Err(AppError::Config(
                    "tessdata_path cannot be empty if provided".to_string(),
                ));
            }
        }
        if let Some(whitelist) = &self.character_whitelist {
            if whitelist.is_empty() {
                return Err(AppError::Config(
                    "character_whitelist cannot be empty if provided".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OcrConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.languages, "eng");
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_config_validation() {
        let mut config = OcrConfig::default();

        config.languages = "".to_string();
        assert!(config.validate().is_err());
        config.languages = "eng+".to_string();
        assert!(config.validate().is_err());
        config.languages = "eng+fra".to_string();
        assert!(config.validate().is_ok());

        config.max_file_size = 0;
        assert!(config.validate().is_err());
        config.max_file_size = MAX_FILE_SIZE;

        config.character_whitelist = Some(String::new());
        assert!(config.validate().is_err());
        config.character_whitelist = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_psm_mode_names() {
        assert_eq!("sparse_text".parse::<PageSegMode>().ok(), Some(PageSegMode::SparseText));
        assert_eq!(" 6 ".parse::<PageSegMode>().ok(), Some(PageSegMode::SingleBlock));
        assert!("diagonal".parse::<PageSegMode>().is_err());
        assert_eq!(PageSegMode::SparseText.as_str(), "11");
    }

    #[test]
    fn test_model_type_names() {
        assert_eq!("Best".parse::<ModelType>().ok(), Some(ModelType::Best));
        assert_eq!("fast".parse::<ModelType>().ok(), Some(ModelType::Fast));
        assert!("accurate".parse::<ModelType>().is_err());
        assert_eq!(ModelType::Best.tessdata_dir(), "tessdata_best");
    }
}
