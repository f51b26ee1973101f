// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Language hints and model file layout.
//
// A hint names one or more language codes joined with `+` (e.g. `eng+urd`).
// Each code needs a recognition model in the model directory; the detection
// model is shared by every language.

use std::path::{Path, PathBuf};

use scanport_core::error::{Result, ScanportError};
use tracing::{debug, warn};

/// Language used when a hint is empty or nothing else is available.
pub const DEFAULT_LANGUAGE: &str = "eng";

pub const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";

/// Split a `+`-joined hint into trimmed, lower-case, de-duplicated codes.
/// An empty hint yields the default language.
pub fn parse_language_hint(hint: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in hint.split('+').map(|c| c.trim().to_ascii_lowercase()) {
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }
    if codes.is_empty() {
        codes.push(DEFAULT_LANGUAGE.to_string());
    }
    codes
}

/// Default model directory: `<cache>/ocrs`, or `./ocrs-models` when no cache
/// directory is known.
pub fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("ocrs"))
        .unwrap_or_else(|| PathBuf::from("ocrs-models"))
}

/// Locates model files for each language in one directory.
#[derive(Debug, Clone)]
pub struct LanguageModels {
    dir: PathBuf,
}

impl Default for LanguageModels {
    fn default() -> Self {
        Self::new(default_model_dir())
    }
}

impl LanguageModels {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn detection_model(&self) -> PathBuf {
        self.dir.join(DETECTION_MODEL_FILENAME)
    }

    /// `text-recognition.rten` for English, `text-recognition-<code>.rten`
    /// for everything else.
    pub fn recognition_model(&self, code: &str) -> PathBuf {
        if code == DEFAULT_LANGUAGE {
            self.dir.join("text-recognition.rten")
        } else {
            self.dir.join(format!("text-recognition-{code}.rten"))
        }
    }

    pub fn is_available(&self, code: &str) -> bool {
        self.recognition_model(code).is_file()
    }

    /// Check every model a hint needs, naming the first missing file.
    pub fn validate(&self, hint: &str) -> Result<Vec<String>> {
        self.require_detection_model()?;
        let codes = parse_language_hint(hint);
        if let Some(code) = codes.iter().find(|code| !self.is_available(code)) {
            return Err(self.missing_language(code));
        }
        Ok(codes)
    }

    /// The installed languages among those `hint` names.
    ///
    /// Codes without a recognition model are dropped. If none is installed
    /// the default language is used when its model exists; otherwise the
    /// error names the first requested model.
    pub fn resolve(&self, hint: &str) -> Result<Vec<String>> {
        self.require_detection_model()?;
        let requested = parse_language_hint(hint);
        let (installed, missing): (Vec<String>, Vec<String>) = requested
            .iter()
            .cloned()
            .partition(|code| self.is_available(code));

        if !missing.is_empty() {
            warn!(?missing, "No model data for some OCR languages, skipping them");
        }
        if !installed.is_empty() {
            debug!(?installed, "OCR languages resolved");
            return Ok(installed);
        }
        if self.is_available(DEFAULT_LANGUAGE) {
            warn!(?requested, "None of the requested OCR languages is installed, using {DEFAULT_LANGUAGE}");
            return Ok(vec![DEFAULT_LANGUAGE.to_string()]);
        }
        let first = requested.first().map_or(DEFAULT_LANGUAGE, String::as_str);
        Err(self.missing_language(first))
    }

    fn require_detection_model(&self) -> Result<()> {
        let detection = self.detection_model();
        if detection.is_file() {
            return Ok(());
        }
        Err(ScanportError::OcrError(format!(
            "detection model not found at {}",
            detection.display()
        )))
    }

    fn missing_language(&self, code: &str) -> ScanportError {
        ScanportError::OcrError(format!(
            "language data for '{code}' not found at {}",
            self.recognition_model(code).display()
        ))
    }
}
