// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR engine backed by the `ocrs` crate, a pure-Rust OCR engine whose neural
// network models run via `rten`.
//
// # Model Setup
//
// The model directory must hold `text-detection.rten` plus one recognition
// model per language (`text-recognition.rten` for English,
// `text-recognition-<code>.rten` otherwise). Running `ocrs-cli` once
// downloads the English pair to `~/.cache/ocrs/`.
//
// **Important:** `ocrs` and `rten` must be compiled in release mode. Debug
// builds are 10-100x slower.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams};
use rten::Model;
use scanport_core::error::{Result, ScanportError};
use scanport_core::types::OcrOutcome;
use tracing::{debug, info, instrument, warn};

use super::TextRecognizer;
use super::language::LanguageModels;
use crate::image::processor::ImageProcessor;

/// One loaded detection + recognition model pair.
pub struct OcrEngine {
    engine: OcrsEngine,
}

impl OcrEngine {
    /// Load the models for a single language.
    ///
    /// Model loading is the expensive step; keep the engine and call
    /// [`recognize_text`](Self::recognize_text) for each page.
    #[instrument(skip(models), fields(dir = %models.dir().display()))]
    pub fn load(models: &LanguageModels, language: &str) -> Result<Self> {
        models.validate(language)?;

        let detection_path = models.detection_model();
        let recognition_path = models.recognition_model(language);

        info!("Loading OCR detection model");
        let detection_model = Model::load_file(&detection_path).map_err(|err| {
            ScanportError::OcrError(format!(
                "failed to load detection model from {}: {}",
                detection_path.display(),
                err
            ))
        })?;

        info!("Loading OCR recognition model");
        let recognition_model = Model::load_file(&recognition_path).map_err(|err| {
            ScanportError::OcrError(format!(
                "failed to load recognition model from {}: {}",
                recognition_path.display(),
                err
            ))
        })?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| ScanportError::OcrError(format!("failed to initialise OCR engine: {}", err)))?;

        info!(language, "OCR engine initialised");
        Ok(Self { engine })
    }

    /// Extract all text from an image, lines separated by newlines.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn recognize_text(&self, image: &DynamicImage) -> Result<String> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            ScanportError::OcrError(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;

        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| ScanportError::OcrError(format!("OCR preprocessing failed: {}", err)))?;

        let text = self.engine.get_text(&input).map_err(|err| {
            ScanportError::OcrError(format!("OCR text recognition failed: {}", err))
        })?;

        debug!(
            line_count = text.lines().count(),
            char_count = text.len(),
            "OCR recognition complete"
        );
        Ok(text)
    }
}

/// [`TextRecognizer`] that runs one engine per requested language and keeps
/// the richest transcript. Engines are loaded on first use and cached.
pub struct OcrsRecognizer {
    models: LanguageModels,
    engines: Mutex<HashMap<String, Arc<OcrEngine>>>,
}

impl OcrsRecognizer {
    pub fn new(models: LanguageModels) -> Self {
        Self {
            models,
            engines: Mutex::new(HashMap::new()),
        }
    }

    fn engine_for(&self, language: &str) -> Result<Arc<OcrEngine>> {
        let mut engines = self
            .engines
            .lock()
            .map_err(|_| ScanportError::OcrError("OCR engine cache poisoned".into()))?;
        if let Some(engine) = engines.get(language) {
            return Ok(Arc::clone(engine));
        }
        let engine = Arc::new(OcrEngine::load(&self.models, language)?);
        engines.insert(language.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    fn run(&self, image_path: &Path, language_hint: &str) -> Result<String> {
        let languages = self.models.resolve(language_hint)?;
        let image = ImageProcessor::open(image_path)?
            .normalized_rgb()
            .into_dynamic();

        let mut best: Option<String> = None;
        for language in &languages {
            let text = self.engine_for(language)?.recognize_text(&image)?;
            if best
                .as_deref()
                .is_none_or(|current| significant_chars(&text) > significant_chars(current))
            {
                best = Some(text);
            }
        }
        Ok(best.unwrap_or_default())
    }
}

impl TextRecognizer for OcrsRecognizer {
    #[instrument(skip(self), fields(path = %image_path.display()))]
    fn recognize(&self, image_path: &Path, language_hint: &str) -> OcrOutcome {
        match self.run(image_path, language_hint) {
            // ocrs does not report a per-page confidence.
            Ok(text) => OcrOutcome::recognized(text, None),
            Err(err) => {
                warn!(error = %err, "Text recognition failed");
                OcrOutcome::failed(err.to_string())
            }
        }
    }
}

fn significant_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_models_fail_the_outcome_not_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = OcrsRecognizer::new(LanguageModels::new(dir.path()));
        let outcome = recognizer.recognize(&dir.path().join("page.jpg"), "eng+urd");
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("detection model"));
    }

    #[test]
    fn missing_secondary_language_does_not_block_recognition() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("text-detection.rten"), b"model").unwrap();
        std::fs::write(dir.path().join("text-recognition.rten"), b"model").unwrap();
        let recognizer = OcrsRecognizer::new(LanguageModels::new(dir.path()));

        // Resolution keeps `eng`, so the failure comes from the image, not `urd`.
        let outcome = recognizer.recognize(&dir.path().join("page.jpg"), "eng+urd");
        let error = outcome.error.unwrap();
        assert!(!error.contains("'urd'"), "{error}");
        assert!(error.contains("failed to open"), "{error}");
    }

    #[test]
    fn significant_chars_ignores_whitespace() {
        assert_eq!(significant_chars(" a b\n c "), 3);
    }
}
