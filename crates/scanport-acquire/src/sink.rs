// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shapes acquisition outcomes into the `ScanResult` handed to callers.

use std::path::PathBuf;

use scanport_core::error::{Result, ScanportError};
use scanport_core::human_errors::humanize_error;
use scanport_core::types::{OcrOutcome, ScanResult};

/// Builds [`ScanResult`] values. Stateless.
pub struct ResultSink;

impl ResultSink {
    /// Successful acquisition of `image_path`. `pages` lists every page of a
    /// multi-page transfer and may be empty for single-file acquisitions.
    pub fn acquired(image_path: PathBuf, pages: Vec<PathBuf>) -> ScanResult {
        ScanResult {
            success: true,
            file_name: ScanResult::file_name_of(&image_path),
            image_path: Some(image_path),
            error_message: None,
            suggestion: None,
            pages,
            recognized_text: None,
        }
    }

    pub fn failed(err: &ScanportError) -> ScanResult {
        ScanResult {
            success: false,
            image_path: None,
            file_name: None,
            error_message: Some(err.to_string()),
            suggestion: Some(humanize_error(err).suggestion),
            pages: Vec::new(),
            recognized_text: None,
        }
    }

    /// The last page becomes the primary image; single pages are not repeated
    /// in `pages`.
    pub fn from_outcome(outcome: Result<Vec<PathBuf>>) -> ScanResult {
        match outcome {
            Ok(mut pages) => match pages.last().cloned() {
                Some(last) => {
                    if pages.len() == 1 {
                        pages.clear();
                    }
                    Self::acquired(last, pages)
                }
                None => Self::failed(&ScanportError::Transfer(
                    "transfer completed without any page".into(),
                )),
            },
            Err(err) => Self::failed(&err),
        }
    }

    /// Attach a recognition outcome. Never changes `success`.
    pub fn annotate(mut result: ScanResult, ocr: OcrOutcome) -> ScanResult {
        result.recognized_text = Some(ocr);
        result
    }
}
