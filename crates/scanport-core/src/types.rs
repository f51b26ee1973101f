// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanport acquisition engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scanner endpoint enumerated from a ready driver session.
///
/// The record is a snapshot: re-initialising the session invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSource {
    /// Identifier callers pass back to `scan` (the driver's source name).
    pub id: String,
    pub display_name: String,
    pub manufacturer: String,
    pub product_family: String,
}

/// Lifecycle of the process-wide driver session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    /// Terminal: every later call reports an initialisation error.
    Failed,
}

/// Lifecycle of a single scan transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Idle,
    Opening,
    Enabling,
    AwaitingTransfer,
    Completing,
    Closed,
    Failed,
}

/// How a source is enabled for acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnableMode {
    /// Show the device-native dialog; tolerant of driver quirks.
    InteractiveUi,
    /// No dialog; the device transfers once a document is detected.
    #[default]
    Headless,
}

/// Status code returned by a driver protocol call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    Success,
    Failure,
    CheckStatus,
    Cancel,
    /// Call was made in the wrong protocol state.
    SequenceError,
    EndOfList,
    /// Driver-specific code with no named mapping.
    Other(u16),
}

impl ReturnCode {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("Success"),
            Self::Failure => f.write_str("Failure"),
            Self::CheckStatus => f.write_str("CheckStatus"),
            Self::Cancel => f.write_str("Cancel"),
            Self::SequenceError => f.write_str("SequenceError"),
            Self::EndOfList => f.write_str("EndOfList"),
            Self::Other(code) => write!(f, "ReturnCode({code})"),
        }
    }
}

/// Outcome of running the OCR collaborator on an acquired file.
///
/// A failed outcome never flips a successful acquisition to failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrOutcome {
    pub success: bool,
    pub text: Option<String>,
    /// Mean recognition confidence in `0.0..=1.0`, when the engine reports one.
    pub confidence: Option<f32>,
    pub error: Option<String>,
}

impl OcrOutcome {
    pub fn recognized(text: String, confidence: Option<f32>) -> Self {
        Self {
            success: true,
            text: Some(text),
            confidence,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            text: None,
            confidence: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of one protocol transaction or one fallback run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub success: bool,
    pub image_path: Option<PathBuf>,
    pub file_name: Option<String>,
    pub error_message: Option<String>,
    /// Plain-English advice for a failed scan.
    pub suggestion: Option<String>,
    /// Every page written by the transaction, in transfer order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognized_text: Option<OcrOutcome>,
}

impl ScanResult {
    /// File name component of `path`, lossily converted.
    pub fn file_name_of(path: &Path) -> Option<String> {
        path.file_name().map(|name| name.to_string_lossy().into_owned())
    }
}

/// File extensions (lowercase, no dot) the fallback monitor treats as scans.
pub const DEFAULT_SCAN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "pdf"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_code_display() {
        assert_eq!(ReturnCode::Failure.to_string(), "Failure");
        assert_eq!(ReturnCode::Other(77).to_string(), "ReturnCode(77)");
        assert!(ReturnCode::Success.is_success());
        assert!(!ReturnCode::Cancel.is_success());
    }

    #[test]
    fn scan_result_serializes_camel_case() {
        let result = ScanResult {
            success: true,
            image_path: Some(PathBuf::from("/scans/scan_20260101_120000.jpg")),
            file_name: Some("scan_20260101_120000.jpg".into()),
            error_message: None,
            suggestion: None,
            pages: Vec::new(),
            recognized_text: Some(OcrOutcome::recognized("INVOICE 42".into(), None)),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["imagePath"], "/scans/scan_20260101_120000.jpg");
        assert_eq!(json["fileName"], "scan_20260101_120000.jpg");
        assert_eq!(json["recognizedText"]["text"], "INVOICE 42");
        assert!(json.get("pages").is_none());
    }

    #[test]
    fn file_name_of_extracts_last_component() {
        let name = ScanResult::file_name_of(Path::new("/a/b/scan.jpg"));
        assert_eq!(name.as_deref(), Some("scan.jpg"));
    }
}
