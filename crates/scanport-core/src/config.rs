// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanportError};
use crate::types::{DEFAULT_SCAN_EXTENSIONS, EnableMode};

/// File name of the persisted configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory acquired images are written to.
    pub output_dir: PathBuf,
    pub session: SessionSettings,
    pub transaction: TransactionSettings,
    pub fallback: FallbackSettings,
    pub ocr: OcrSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            session: SessionSettings::default(),
            transaction: TransactionSettings::default(),
            fallback: FallbackSettings::default(),
            ocr: OcrSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load `config.json` from `data_dir`, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default()
    }

    /// Write the config as pretty JSON into `data_dir`.
    pub fn persist(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(data_dir.join(CONFIG_FILE), json)?;
        Ok(())
    }

    /// Reject settings that would make the wait loops degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.session.pump_interval_ms == 0 || self.transaction.wait_poll_ms == 0 {
            return Err(ScanportError::Config(
                "pump and wait intervals must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.transaction.jpeg_quality) {
            return Err(ScanportError::Config(format!(
                "jpeg quality {} is outside 1-100",
                self.transaction.jpeg_quality
            )));
        }
        if self.fallback.poll_interval_ms == 0 || self.fallback.validity_retries == 0 {
            return Err(ScanportError::Config(
                "fallback poll interval and retry count must be non-zero".into(),
            ));
        }
        if self.fallback.extensions.is_empty() {
            return Err(ScanportError::Config(
                "fallback extension allow-list is empty".into(),
            ));
        }
        Ok(())
    }
}

/// Driver session start-up and event pumping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How long `initialize` waits for the session thread to report ready.
    pub init_timeout_ms: u64,
    /// Maximum gap between two event-pump steps on the session thread.
    pub pump_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            init_timeout_ms: 5_000,
            pump_interval_ms: 10,
        }
    }
}

impl SessionSettings {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms)
    }
}

/// Timing of a protocol scan transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionSettings {
    pub enable_mode: EnableMode,
    /// Overall window for the first data notification.
    pub transfer_timeout_ms: u64,
    /// Grace period after data arrives for the source-disabled notification.
    pub settle_window_ms: u64,
    /// Pause after closing the source so the device can reset.
    pub close_settle_ms: u64,
    /// Extra pump steps run after the close pause.
    pub close_pump_cycles: u32,
    /// Sleep between pump steps while waiting for a transfer.
    pub wait_poll_ms: u64,
    /// Interval of the "still waiting" progress log.
    pub progress_log_interval_ms: u64,
    /// JPEG quality (1-100) for decoded pages.
    pub jpeg_quality: u8,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            enable_mode: EnableMode::Headless,
            transfer_timeout_ms: 60_000,
            settle_window_ms: 2_000,
            close_settle_ms: 500,
            close_pump_cycles: 5,
            wait_poll_ms: 50,
            progress_log_interval_ms: 5_000,
            jpeg_quality: 90,
        }
    }
}

impl TransactionSettings {
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    pub fn close_settle(&self) -> Duration {
        Duration::from_millis(self.close_settle_ms)
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }

    pub fn progress_log_interval(&self) -> Duration {
        Duration::from_millis(self.progress_log_interval_ms)
    }
}

/// Directory-watch acquisition used when the protocol path is unreliable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    pub poll_interval_ms: u64,
    pub watch_timeout_ms: u64,
    /// Attempts to find a non-empty file once a new one has been detected.
    pub validity_retries: u32,
    pub validity_retry_interval_ms: u64,
    /// Watched in addition to the output dir and the platform defaults.
    pub extra_candidate_dirs: Vec<PathBuf>,
    /// Vendor utility launched to start a scan; `None` waits for a button press.
    pub trigger_program: Option<PathBuf>,
    pub trigger_args: Vec<String>,
    /// Lowercase extensions without the dot.
    pub extensions: Vec<String>,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            watch_timeout_ms: 30_000,
            validity_retries: 10,
            validity_retry_interval_ms: 500,
            extra_candidate_dirs: Vec::new(),
            trigger_program: None,
            trigger_args: vec!["/auto".into()],
            extensions: DEFAULT_SCAN_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl FallbackSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn watch_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_timeout_ms)
    }

    pub fn validity_retry_interval(&self) -> Duration {
        Duration::from_millis(self.validity_retry_interval_ms)
    }
}

/// Text recognition run on fallback acquisitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub enabled: bool,
    /// Language hint; several codes may be joined with `+` (e.g. `eng+urd`).
    pub language: String,
    /// Model directory; `None` uses the ocrs cache directory.
    pub model_dir: Option<PathBuf>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "eng".into(),
            model_dir: None,
        }
    }
}

/// `<Documents>/Scans`, or `./Scans` when no documents dir is known.
pub fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Scans")
}

/// Application data directory (`$XDG_DATA_HOME/scanport` on Linux).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("scanport")
}
