// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for scan failures.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives how a front end presents the failure.

use crate::error::ScanportError;
use crate::types::ReturnCode;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Timeout or busy device — trying again may work.
    Transient,
    /// User must do something (load paper, plug in the scanner, pick a source).
    ActionRequired,
    /// Cannot be fixed by retrying or user action.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `ScanportError` into a `HumanError`.
pub fn humanize_error(err: &ScanportError) -> HumanError {
    match err {
        ScanportError::Initialization(_) => HumanError {
            message: "The scanner service couldn't start.".into(),
            suggestion: "Check that the scanner driver is installed, then restart the service.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanportError::SessionClosed => HumanError {
            message: "The scanner service has been shut down.".into(),
            suggestion: "Restart the service to scan again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanportError::SourceNotFound { source_id } => HumanError {
            message: format!("We couldn't find the scanner \"{source_id}\"."),
            suggestion: "Make sure the scanner is switched on and connected, then refresh the scanner list.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanportError::OpenFailure { code, .. } => humanize_return_code(*code, "connect to"),

        ScanportError::EnableFailure { code, .. } => humanize_return_code(*code, "start"),

        ScanportError::Transfer(_) => HumanError {
            message: "The scanner stopped while sending the page.".into(),
            suggestion: "Check for a paper jam or an open cover, then scan again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanportError::TransferTimeout { .. } => HumanError {
            message: "No page arrived from the scanner.".into(),
            suggestion: "The scan was cancelled or the scanner didn't respond. Load the page and try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanportError::ScannerBusy => HumanError {
            message: "The scanner is busy with another scan.".into(),
            suggestion: "Wait for the current scan to finish, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanportError::Decode(_) | ScanportError::ImageError(_) => HumanError {
            message: "The scanned image couldn't be read.".into(),
            suggestion: "Try scanning again, or choose a different colour mode in the scanner settings.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanportError::DetectionTimeout { .. } => HumanError {
            message: "No scanned file appeared.".into(),
            suggestion: "Press the scan button on the scanner, or check where the scanner software saves files.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        ScanportError::NoValidFile { .. } => HumanError {
            message: "The scanner started saving a file but didn't finish.".into(),
            suggestion: "Wait a moment for the scanner to finish, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanportError::OcrError(_) => HumanError {
            message: "Text recognition didn't work on this scan.".into(),
            suggestion: "The image was saved. Check the language data is installed, or rescan with clearer text.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanportError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "The output folder couldn't be found.".into(),
                suggestion: "Check the output folder exists, or choose a different one.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "The service isn't allowed to save into that folder.".into(),
                suggestion: "Check the folder permissions, or choose a different output folder.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        ScanportError::Serialization(_) | ScanportError::Config(_) => HumanError {
            message: "The service settings couldn't be read.".into(),
            suggestion: "Check config.json, or delete it to restore the defaults.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanportError::PlatformUnavailable => HumanError {
            message: "Scanner drivers aren't available on this computer.".into(),
            suggestion: "Use the folder-watch scan mode, or run the service on a computer with the scanner driver installed.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

/// Map a driver return code from an open/enable call.
fn humanize_return_code(code: ReturnCode, verb: &str) -> HumanError {
    match code {
        ReturnCode::Cancel => HumanError {
            message: "The scan was cancelled.".into(),
            suggestion: "Start the scan again when you're ready.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        ReturnCode::SequenceError => HumanError {
            message: "The scanner was still busy from the last scan.".into(),
            suggestion: "Wait a few seconds and try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        _ => HumanError {
            message: format!("We couldn't {verb} the scanner."),
            suggestion: format!(
                "Check the scanner is on and not in use by another program. (Driver reported: {code})"
            ),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_timeout_is_transient() {
        let human = humanize_error(&ScanportError::TransferTimeout { waited_secs: 60 });
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn missing_source_names_the_scanner() {
        let human = humanize_error(&ScanportError::SourceNotFound {
            source_id: "Flatbed 3000".into(),
        });
        assert!(human.message.contains("Flatbed 3000"));
        assert_eq!(human.severity, Severity::ActionRequired);
    }

    #[test]
    fn open_failure_reports_driver_code() {
        let human = humanize_error(&ScanportError::OpenFailure {
            source_id: "s".into(),
            code: ReturnCode::Failure,
        });
        assert!(human.suggestion.contains("Failure"));
    }

    #[test]
    fn sequence_error_suggests_waiting() {
        let human = humanize_error(&ScanportError::EnableFailure {
            source_id: "s".into(),
            code: ReturnCode::SequenceError,
        });
        assert!(human.suggestion.contains("Wait"));
    }

    #[test]
    fn initialization_is_permanent() {
        let human = humanize_error(&ScanportError::Initialization("timed out".into()));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }
}
