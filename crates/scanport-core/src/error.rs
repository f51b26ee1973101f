// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanport.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ReturnCode;

/// Top-level error type for all Scanport operations.
#[derive(Debug, Error)]
pub enum ScanportError {
    // -- Session errors --
    /// The driver session never became ready, or failed to open. Fatal until
    /// the process restarts.
    #[error("scanner service failed to initialise: {0}")]
    Initialization(String),

    #[error("scanner session is shut down")]
    SessionClosed,

    // -- Transaction errors --
    #[error("scanner '{source_id}' not found")]
    SourceNotFound { source_id: String },

    #[error("failed to open scanner '{source_id}': {code}")]
    OpenFailure { source_id: String, code: ReturnCode },

    #[error("failed to enable scanner '{source_id}': {code}")]
    EnableFailure { source_id: String, code: ReturnCode },

    #[error("transfer error: {0}")]
    Transfer(String),

    #[error("scan was cancelled or timed out after {waited_secs}s without receiving data")]
    TransferTimeout { waited_secs: u64 },

    #[error("another scan is already in progress")]
    ScannerBusy,

    // -- Decoding errors --
    #[error("bitmap decode failed: {0}")]
    Decode(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Fallback acquisition --
    #[error("no new scan file appeared in the watched directories within {waited_secs}s")]
    DetectionTimeout { waited_secs: u64 },

    #[error(
        "a new file appeared in {} but no complete image was found after {attempts} attempts",
        directory.display()
    )]
    NoValidFile { directory: PathBuf, attempts: u32 },

    // -- OCR --
    #[error("OCR failed: {0}")]
    OcrError(String),

    // -- Storage / configuration --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    // -- Platform --
    #[error("no scanner driver subsystem is available on this platform")]
    PlatformUnavailable,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanportError>;
