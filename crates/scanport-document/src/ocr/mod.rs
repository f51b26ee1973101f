// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognition for acquired pages.
//
// The acquisition layer only sees the `TextRecognizer` trait. The `ocrs`
// backed engine lives in `engine` and is compiled with the `ocr` feature;
// without it, `UnavailableRecognizer` reports a descriptive failure.

pub mod language;

#[cfg(feature = "ocr")]
pub mod engine;

use std::path::Path;

use scanport_core::types::OcrOutcome;

pub use language::{LanguageModels, parse_language_hint};

/// Recognises text in an image file.
///
/// Failures are reported inside the returned [`OcrOutcome`], never as an
/// error, so recognition cannot fail the acquisition that produced the file.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image_path: &Path, language_hint: &str) -> OcrOutcome;
}

/// Recogniser used when no OCR engine is compiled in or configured.
#[derive(Debug, Clone, Default)]
pub struct UnavailableRecognizer {
    reason: Option<String>,
}

impl UnavailableRecognizer {
    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl TextRecognizer for UnavailableRecognizer {
    fn recognize(&self, _image_path: &Path, _language_hint: &str) -> OcrOutcome {
        OcrOutcome::failed(
            self.reason
                .clone()
                .unwrap_or_else(|| "text recognition is not available in this build".into()),
        )
    }
}
