// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Out-of-band scan triggers for the fallback path.
//
// Triggering is best-effort: the monitor logs a failed trigger and keeps
// watching, since the user may still press the scanner's button.

use std::path::PathBuf;

use scanport_core::error::{Result, ScanportError};
use tokio::process::Command;
use tracing::{info, instrument};

pub trait AcquisitionTrigger: Send + Sync {
    /// Start an acquisition without waiting for it to finish.
    fn fire(&self) -> Result<()>;
}

/// Launches a vendor scan utility with its auto-scan arguments.
#[derive(Debug, Clone)]
pub struct ExternalUtilityTrigger {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalUtilityTrigger {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl AcquisitionTrigger for ExternalUtilityTrigger {
    /// Must be called inside a Tokio runtime.
    #[instrument(skip(self), fields(program = %self.program.display()))]
    fn fire(&self) -> Result<()> {
        // Bare names are looked up on PATH by spawn.
        let child = Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => ScanportError::Config(format!(
                    "scan utility {} not found",
                    self.program.display()
                )),
                _ => ScanportError::Io(err),
            })?;
        info!(pid = child.id(), args = ?self.args, "Scan utility launched");
        Ok(())
    }
}

/// Relies on the user starting the scan at the device.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrigger;

impl AcquisitionTrigger for NoTrigger {
    fn fire(&self) -> Result<()> {
        info!("No scan utility configured, waiting for a scan started at the device");
        Ok(())
    }
}
