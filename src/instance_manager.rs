//! # OCR Instance Manager Module
//!
//! Pooled Tesseract instances behind the [`OcrEngine`] trait.
//!
//! Creating a Tesseract instance loads the language models (~100-500ms), so
//! instances are checked out of a pool for one recognition and returned
//! afterwards. The pool grows on demand up to the number of concurrent
//! recognitions and never shrinks while the engine lives.

use leptess::LepTess;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::ocr::OcrEngine;
use crate::ocr_config::{ModelType, OcrConfig};
use crate::ocr_errors::OcrError;

/// Tesseract-backed [`OcrEngine`] with a checkout/return instance pool
pub struct TesseractEngine {
    config: OcrConfig,
    tessdata_path: Option<String>,
    idle: Mutex<Vec<LepTess>>,
}

impl TesseractEngine {
    /// Create an engine and eagerly initialize one instance, so a missing
    /// language model fails at startup instead of on the first image
    pub fn new(config: OcrConfig) -> Result<Self, OcrError> {
        let tessdata_path = config
            .tessdata_path
            .clone()
            .or_else(|| Self::get_tessdata_path(config.model_type));

        let engine = Self {
            config,
            tessdata_path,
            idle: Mutex::new(Vec::new()),
        };
        let first = engine.create_instance()?;
        engine.idle.lock().push(first);
        Ok(engine)
    }

    fn create_instance(&self) -> Result<LepTess, OcrError> {
        info!(
            languages = %self.config.languages,
            model = self.config.model_type.tessdata_dir(),
            "Creating new Tesseract instance"
        );

        let mut tess = LepTess::new(self.tessdata_path.as_deref(), &self.config.languages)
            .map_err(|e| OcrError::Initialization(format!("Failed to initialize Tesseract: {}", e)))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            self.config.psm_mode.as_str(),
        )
        .map_err(|e| OcrError::Initialization(format!("Failed to set PSM mode: {}", e)))?;

        if let Some(whitelist) = &self.config.character_whitelist {
            tess.set_variable(leptess::Variable::TesseditCharWhitelist, whitelist)
                .map_err(|e| {
                    OcrError::Initialization(format!("Failed to set character whitelist: {}", e))
                })?;
        }

        Ok(tess)
    }

    fn checkout(&self) -> Result<LepTess, OcrError> {
        match self.idle.lock().pop() {
            Some(tess) => Ok(tess),
            None => self.create_instance(),
        }
    }

    fn give_back(&self, tess: LepTess) {
        self.idle.lock().push(tess);
    }

    /// Search the usual install locations for the model directory
    fn get_tessdata_path(model_type: ModelType) -> Option<String> {
        let dir = model_type.tessdata_dir();
        let possible_paths = [
            format!("/usr/share/tesseract-ocr/5/{dir}"),
            format!("/usr/share/tesseract-ocr/4.00/{dir}"),
            format!("/usr/share/{dir}"),
            format!("/usr/local/share/{dir}"),
        ];

        if let Some(path) = possible_paths.iter().find(|p| Path::new(p).exists()) {
            info!(path = %path, "Using tessdata path");
            return Some(path.clone());
        }

        debug!(?model_type, "No model-specific tessdata path found, using default");
        None
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image_png: &[u8]) -> Result<String, OcrError> {
        let mut tess = self.checkout()?;

        if let Err(e) = tess.set_image_from_mem(image_png) {
            // Image state is unknown after a failed load; drop the instance
            warn!(error = %e, "Discarding Tesseract instance after image load failure");
            return Err(OcrError::ImageLoad(format!("Failed to load image for OCR: {}", e)));
        }

        let text = tess
            .get_utf8_text()
            .map_err(|e| OcrError::Extraction(format!("Failed to extract text from image: {}", e)));
        self.give_back(tess);
        text
    }
}
