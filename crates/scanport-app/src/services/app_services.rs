// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service construction — loads the persisted config, applies
// command-line overrides, and builds the scan service around the platform
// driver binding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scanport_acquire::{DriverSession, ScanService};
use scanport_core::AppConfig;
use scanport_core::config;
use scanport_core::types::EnableMode;
use scanport_document::TextRecognizer;
use tracing::info;

/// Command-line settings that take precedence over `config.json`.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub interactive: bool,
    pub language: Option<String>,
}

/// Load `config.json` from the data directory and apply `overrides`.
pub fn load_config(data_dir: &Path, overrides: &Overrides) -> AppConfig {
    let mut config = AppConfig::load_or_default(data_dir);
    if let Some(dir) = &overrides.output_dir {
        config.output_dir = dir.clone();
    }
    if overrides.interactive {
        config.transaction.enable_mode = EnableMode::InteractiveUi;
    }
    if let Some(language) = &overrides.language {
        config.ocr.language = language.clone();
    }
    config
}

/// Build the service. The session is created but not initialised.
pub fn build(overrides: &Overrides) -> scanport_core::error::Result<ScanService> {
    let dir = config::data_dir();
    info!(path = %dir.display(), "Loading configuration");
    let config = load_config(&dir, overrides);
    config.validate()?;

    let session = DriverSession::new(scanport_driver::platform_driver, config.session.clone());
    let recognizer = recognizer(&config);
    Ok(ScanService::new(session, config, recognizer))
}

#[cfg(feature = "ocr")]
fn recognizer(config: &AppConfig) -> Arc<dyn TextRecognizer> {
    use scanport_document::{LanguageModels, OcrsRecognizer};

    let models = config
        .ocr
        .model_dir
        .clone()
        .map(LanguageModels::new)
        .unwrap_or_default();
    info!(dir = %models.dir().display(), "OCR models directory");
    Arc::new(OcrsRecognizer::new(models))
}

#[cfg(not(feature = "ocr"))]
fn recognizer(config: &AppConfig) -> Arc<dyn TextRecognizer> {
    use scanport_document::UnavailableRecognizer;

    if config.ocr.enabled {
        tracing::warn!("Built without the `ocr` feature; text recognition is disabled");
    }
    Arc::new(UnavailableRecognizer::because(
        "scanport was built without the `ocr` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_persisted_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut persisted = AppConfig::default();
        persisted.ocr.language = "deu".into();
        persisted.persist(dir.path()).unwrap();

        let config = load_config(
            dir.path(),
            &Overrides {
                output_dir: Some(PathBuf::from("/srv/scans")),
                interactive: true,
                language: Some("eng+urd".into()),
            },
        );
        assert_eq!(config.output_dir, PathBuf::from("/srv/scans"));
        assert_eq!(config.transaction.enable_mode, EnableMode::InteractiveUi);
        assert_eq!(config.ocr.language, "eng+urd");
    }

    #[test]
    fn no_overrides_keep_persisted_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut persisted = AppConfig::default();
        persisted.ocr.language = "deu".into();
        persisted.persist(dir.path()).unwrap();

        let config = load_config(dir.path(), &Overrides::default());
        assert_eq!(config.ocr.language, "deu");
        assert_eq!(config.transaction.enable_mode, EnableMode::Headless);
    }
}
