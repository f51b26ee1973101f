// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanport-document — Turns driver transfers into image files.
//
// Provides DIB decoding (header validation, palette expansion, row
// orientation), JPEG output, and text recognition for acquired pages.

pub mod bitmap;
pub mod image;
pub mod ocr;

pub use bitmap::BitmapDecoder;
pub use image::processor::ImageProcessor;
pub use ocr::{LanguageModels, TextRecognizer, UnavailableRecognizer};

#[cfg(feature = "ocr")]
pub use ocr::engine::{OcrEngine, OcrsRecognizer};
