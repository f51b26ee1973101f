// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan service — the operations exposed to front ends.
//
// Protocol scans are exclusive: a scan requested while another is running is
// rejected with `ScannerBusy` instead of queueing behind it. The fallback
// path does not touch the driver session and is not exclusive.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use scanport_core::config::AppConfig;
use scanport_core::error::{Result, ScanportError};
use scanport_core::types::{DeviceSource, ScanResult};
use scanport_document::{BitmapDecoder, TextRecognizer};
use tracing::{info, instrument};

use crate::fallback::FallbackAcquisitionMonitor;
use crate::orchestrator::ScanOrchestrator;
use crate::session::DriverSession;
use crate::sink::ResultSink;
use crate::trigger::AcquisitionTrigger;

/// Holds the busy flag for the lifetime of one protocol transaction.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cheap to clone; clones share the session and the busy flag.
#[derive(Clone)]
pub struct ScanService {
    session: Arc<DriverSession>,
    config: Arc<AppConfig>,
    decoder: BitmapDecoder,
    recognizer: Arc<dyn TextRecognizer>,
    trigger: Option<Arc<dyn AcquisitionTrigger>>,
    busy: Arc<AtomicBool>,
}

impl ScanService {
    pub fn new(
        session: DriverSession,
        config: AppConfig,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Self {
        let decoder = BitmapDecoder::with_quality(config.transaction.jpeg_quality);
        Self {
            session: Arc::new(session),
            config: Arc::new(config),
            decoder,
            recognizer,
            trigger: None,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the trigger built from the fallback settings.
    pub fn with_trigger(mut self, trigger: Arc<dyn AcquisitionTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &DriverSession {
        &self.session
    }

    /// Blocks until the session is ready or has failed.
    pub fn initialize(&self) -> Result<()> {
        self.session.initialize()
    }

    /// Blocks while the session thread enumerates sources.
    pub fn list_sources(&self) -> Result<Vec<DeviceSource>> {
        self.session.call(|driver| driver.sources())?
    }

    /// Acquire from `source_id` over the driver protocol.
    #[instrument(skip(self), fields(dir = %output_dir.display()))]
    pub async fn scan(&self, source_id: &str, output_dir: &Path) -> ScanResult {
        let Some(guard) = BusyGuard::acquire(&self.busy) else {
            info!("Rejecting scan, another scan is in progress");
            return ResultSink::failed(&ScanportError::ScannerBusy);
        };

        let settings = self.config.transaction.clone();
        let decoder = self.decoder;
        let source = source_id.to_string();
        let dir = output_dir.to_path_buf();
        let outcome = self
            .session
            .call_async(move |driver| {
                // Released when the transaction really ends, even if the
                // caller stops waiting.
                let _guard = guard;
                ScanOrchestrator::execute(driver, settings, decoder, &source, &dir)
            })
            .await
            .and_then(|pages| pages);

        let result = ResultSink::from_outcome(outcome);
        if result.success {
            info!(file = ?result.file_name, "Scan complete");
        }
        result
    }

    /// Acquire by watching for a file written out of band, then run text
    /// recognition on it when enabled.
    #[instrument(skip(self), fields(dir = %output_dir.display()))]
    pub async fn scan_with_fallback(&self, source_id: &str, output_dir: &Path) -> ScanResult {
        if let Err(err) = tokio::fs::create_dir_all(output_dir).await {
            return ResultSink::failed(&ScanportError::from(err));
        }

        let mut monitor = FallbackAcquisitionMonitor::new(self.config.fallback.clone(), output_dir);
        if let Some(trigger) = &self.trigger {
            monitor = monitor.with_trigger(Arc::clone(trigger));
        }
        if self.config.ocr.enabled {
            monitor = monitor
                .with_recognizer(Arc::clone(&self.recognizer), self.config.ocr.language.clone());
        }
        monitor.run().await
    }
}
