// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan transaction state machine.
//
// A transaction runs entirely on the session thread:
//
//   Idle → Opening → Enabling → AwaitingTransfer → Completing → Closed
//                                      (any step) → Failed
//
// While waiting it sleeps in short steps and pumps the binding between them,
// so notifications keep arriving. Teardown (unsubscribe, close the source,
// settle, extra pumps) runs from `Drop`, so every exit path performs it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use scanport_core::config::TransactionSettings;
use scanport_core::error::{Result, ScanportError};
use scanport_core::types::{EnableMode, ReturnCode, TransactionId, TransactionState};
use scanport_document::BitmapDecoder;
use scanport_driver::{DeviceEvent, DeviceProtocol, EventReceiver, SubscriptionId, event_channel};
use tracing::{debug, info, instrument, warn};

/// One acquisition attempt against an open protocol session.
pub struct ScanOrchestrator<'d> {
    driver: &'d mut dyn DeviceProtocol,
    settings: TransactionSettings,
    decoder: BitmapDecoder,
    id: TransactionId,
    state: TransactionState,
    source_id: Option<String>,
    subscription: Option<SubscriptionId>,
    events: Option<EventReceiver>,
}

impl<'d> ScanOrchestrator<'d> {
    pub fn new(
        driver: &'d mut dyn DeviceProtocol,
        settings: TransactionSettings,
        decoder: BitmapDecoder,
    ) -> Self {
        Self {
            driver,
            settings,
            decoder,
            id: TransactionId::new(),
            state: TransactionState::Idle,
            source_id: None,
            subscription: None,
            events: None,
        }
    }

    /// Open, enable, and wait for pages; teardown runs when this returns.
    pub fn execute(
        driver: &'d mut dyn DeviceProtocol,
        settings: TransactionSettings,
        decoder: BitmapDecoder,
        source_id: &str,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mode = settings.enable_mode;
        let timeout = settings.transfer_timeout();
        let mut transaction = Self::new(driver, settings, decoder);
        transaction.open(source_id)?;
        transaction.enable(mode)?;
        transaction.await_transfer(output_dir, timeout)
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    fn fail(&mut self, err: ScanportError) -> ScanportError {
        warn!(transaction = %self.id, error = %err, "Scan transaction failed");
        self.state = TransactionState::Failed;
        err
    }

    /// Resolve `source_id` against the current enumeration and open it.
    #[instrument(skip(self), fields(transaction = %self.id))]
    pub fn open(&mut self, source_id: &str) -> Result<()> {
        self.state = TransactionState::Opening;

        let sources = match self.driver.sources() {
            Ok(sources) => sources,
            Err(err) => return Err(self.fail(err)),
        };
        if !sources.iter().any(|source| source.id == source_id) {
            return Err(self.fail(ScanportError::SourceNotFound {
                source_id: source_id.to_string(),
            }));
        }

        let code = self.driver.open_source(source_id);
        if !code.is_success() {
            return Err(self.fail(ScanportError::OpenFailure {
                source_id: source_id.to_string(),
                code,
            }));
        }

        self.source_id = Some(source_id.to_string());
        info!(source = source_id, "Source opened");
        Ok(())
    }

    /// Subscribe to notifications and enable the opened source.
    #[instrument(skip(self), fields(transaction = %self.id))]
    pub fn enable(&mut self, mode: EnableMode) -> Result<()> {
        self.state = TransactionState::Enabling;
        let Some(source_id) = self.source_id.clone() else {
            return Err(self.fail(ScanportError::EnableFailure {
                source_id: String::new(),
                code: ReturnCode::SequenceError,
            }));
        };

        let (sender, receiver) = event_channel();
        self.subscription = Some(self.driver.subscribe(sender));
        self.events = Some(receiver);

        let window = match mode {
            EnableMode::InteractiveUi => self.driver.window_context(),
            EnableMode::Headless => Default::default(),
        };
        let code = self.driver.enable_source(&source_id, mode, window);
        if !code.is_success() {
            return Err(self.fail(ScanportError::EnableFailure { source_id, code }));
        }

        info!(source = %source_id, ?mode, "Source enabled, waiting for transfer");
        Ok(())
    }

    /// Pump and wait until the transfer completes, fails, or times out.
    ///
    /// Each page is decoded into `output_dir` as it arrives. Once data has
    /// been seen, the transaction completes on source-disabled or when the
    /// settle window passes without one.
    #[instrument(skip(self), fields(transaction = %self.id, dir = %output_dir.display()))]
    pub fn await_transfer(&mut self, output_dir: &Path, timeout: Duration) -> Result<Vec<PathBuf>> {
        self.state = TransactionState::AwaitingTransfer;
        let Some(mut events) = self.events.take() else {
            return Err(self.fail(ScanportError::Transfer(
                "transfer awaited before the source was enabled".into(),
            )));
        };

        let started = Instant::now();
        let mut last_progress = started;
        let mut last_page: Option<Instant> = None;
        let mut pages = Vec::new();

        loop {
            self.driver.pump();

            while let Ok(event) = events.try_recv() {
                match event {
                    DeviceEvent::DataTransferred(mut memory) => {
                        info!(handle = ?memory.handle(), "Data transferred");
                        match self.decoder.decode_transfer(memory.as_mut(), output_dir) {
                            Ok(path) => {
                                pages.push(path);
                                last_page = Some(Instant::now());
                            }
                            Err(err) => return Err(self.fail(err)),
                        }
                    }
                    DeviceEvent::TransferError { code, detail } => {
                        let message =
                            detail.unwrap_or_else(|| format!("driver reported {code}"));
                        return Err(self.fail(ScanportError::Transfer(message)));
                    }
                    DeviceEvent::SourceDisabled if pages.is_empty() => {
                        return Err(self.fail(ScanportError::TransferTimeout {
                            waited_secs: started.elapsed().as_secs(),
                        }));
                    }
                    DeviceEvent::SourceDisabled => {
                        info!(pages = pages.len(), "Source disabled, transfer complete");
                        self.state = TransactionState::Completing;
                        return Ok(pages);
                    }
                }
            }

            match last_page {
                Some(at) if at.elapsed() >= self.settings.settle_window() => {
                    info!(
                        pages = pages.len(),
                        "No completion notification within settle window, completing"
                    );
                    self.state = TransactionState::Completing;
                    return Ok(pages);
                }
                Some(_) => {}
                None if started.elapsed() >= timeout => {
                    return Err(self.fail(ScanportError::TransferTimeout {
                        waited_secs: timeout.as_secs(),
                    }));
                }
                None if last_progress.elapsed() >= self.settings.progress_log_interval() => {
                    info!(
                        waited_secs = started.elapsed().as_secs(),
                        "Waiting for scan data"
                    );
                    last_progress = Instant::now();
                }
                None => {}
            }

            std::thread::sleep(self.settings.wait_poll());
        }
    }

    fn teardown(&mut self) {
        if let Some(id) = self.subscription.take() {
            if let Err(err) = self.driver.unsubscribe(id) {
                warn!(transaction = %self.id, error = %err, "Unsubscribe failed during teardown");
            }
        }
        self.events = None;

        let Some(source_id) = self.source_id.take() else {
            return;
        };
        let code = self.driver.close_source(&source_id);
        if !code.is_success() {
            warn!(transaction = %self.id, source = %source_id, %code, "Closing source failed");
        }

        std::thread::sleep(self.settings.close_settle());
        for _ in 0..self.settings.close_pump_cycles {
            self.driver.pump();
        }
        debug!(transaction = %self.id, source = %source_id, "Source closed");
    }
}

impl Drop for ScanOrchestrator<'_> {
    fn drop(&mut self) {
        self.teardown();
        if self.state != TransactionState::Failed {
            self.state = TransactionState::Closed;
        }
    }
}
