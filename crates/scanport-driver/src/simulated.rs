// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scriptable in-process binding.
//
// Each source carries a script: the return codes for open/enable and a list
// of timed notifications released by `pump` once enable succeeds. Every call
// is recorded in a shared `DriverLog` so callers can assert on teardown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scanport_core::error::{Result, ScanportError};
use scanport_core::native::{HeapMemory, NativeHandle, TransferMemory};
use scanport_core::types::{DeviceSource, EnableMode, ReturnCode};
use tracing::debug;

use crate::traits::*;

/// A notification the simulated driver emits after enable.
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    /// Deliver these bytes as a transferred page.
    Data(Vec<u8>),
    /// Deliver a page whose handle is null.
    NullData,
    TransferError(ReturnCode),
    SourceDisabled,
}

/// Behaviour of one simulated source.
#[derive(Debug, Clone)]
pub struct SourceScript {
    pub source: DeviceSource,
    pub open: ReturnCode,
    pub enable: ReturnCode,
    /// Notifications with their delay measured from a successful enable.
    pub events: Vec<(Duration, ScriptedEvent)>,
}

impl SourceScript {
    pub fn new(id: &str) -> Self {
        Self {
            source: DeviceSource {
                id: id.to_string(),
                display_name: id.to_string(),
                manufacturer: "Simulated".into(),
                product_family: "Virtual Scanner".into(),
            },
            open: ReturnCode::Success,
            enable: ReturnCode::Success,
            events: Vec::new(),
        }
    }

    pub fn open_returns(mut self, code: ReturnCode) -> Self {
        self.open = code;
        self
    }

    pub fn enable_returns(mut self, code: ReturnCode) -> Self {
        self.enable = code;
        self
    }

    pub fn after(mut self, delay: Duration, event: ScriptedEvent) -> Self {
        self.events.push((delay, event));
        self
    }
}

/// Record of every call made against a [`SimulatedDriver`].
#[derive(Debug, Default, Clone)]
pub struct DriverLog {
    pub sessions_opened: u32,
    pub sessions_closed: u32,
    pub opened: Vec<String>,
    pub enabled: Vec<(String, EnableMode)>,
    pub closed: Vec<String>,
    pub subscribed: u32,
    pub unsubscribed: u32,
    pub pumps: u64,
    pub locks: u32,
    pub unlocks: u32,
}

impl DriverLog {
    /// Subscriptions still registered.
    pub fn active_subscriptions(&self) -> u32 {
        self.subscribed.saturating_sub(self.unsubscribed)
    }
}

/// Simulated driver binding.
pub struct SimulatedDriver {
    scripts: Vec<SourceScript>,
    fail_session: bool,
    session_open: bool,
    log: Arc<Mutex<DriverLog>>,
    subscribers: Vec<(SubscriptionId, EventSender)>,
    pending: VecDeque<(Instant, ScriptedEvent)>,
    next_subscription: u64,
    next_handle: usize,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self {
            scripts: Vec::new(),
            fail_session: false,
            session_open: false,
            log: Arc::new(Mutex::new(DriverLog::default())),
            subscribers: Vec::new(),
            pending: VecDeque::new(),
            next_subscription: 0,
            next_handle: 0x1000,
        }
    }

    pub fn with_source(mut self, script: SourceScript) -> Self {
        self.scripts.push(script);
        self
    }

    /// Make `open_session` fail.
    pub fn failing_session(mut self) -> Self {
        self.fail_session = true;
        self
    }

    /// Shared handle to the call log.
    pub fn log(&self) -> Arc<Mutex<DriverLog>> {
        Arc::clone(&self.log)
    }

    fn record(&self, update: impl FnOnce(&mut DriverLog)) {
        if let Ok(mut log) = self.log.lock() {
            update(&mut log);
        }
    }

    fn script(&self, source_id: &str) -> Option<&SourceScript> {
        self.scripts.iter().find(|s| s.source.id == source_id)
    }

    fn deliver(&mut self, event: &ScriptedEvent) {
        for (id, sink) in &self.subscribers {
            let outgoing = match event {
                ScriptedEvent::Data(bytes) => {
                    self.next_handle += 1;
                    DeviceEvent::DataTransferred(Box::new(SimulatedMemory {
                        inner: HeapMemory::new(NativeHandle(self.next_handle), bytes.clone()),
                        log: Arc::clone(&self.log),
                    }))
                }
                ScriptedEvent::NullData => DeviceEvent::DataTransferred(Box::new(SimulatedMemory {
                    inner: HeapMemory::new(NativeHandle::NULL, Vec::new()),
                    log: Arc::clone(&self.log),
                })),
                ScriptedEvent::TransferError(code) => DeviceEvent::TransferError {
                    code: *code,
                    detail: Some(format!("simulated transfer error: {code}")),
                },
                ScriptedEvent::SourceDisabled => DeviceEvent::SourceDisabled,
            };
            if sink.try_send(outgoing).is_err() {
                debug!(subscription = id.0, "notification dropped: sink full or closed");
            }
        }
    }
}

impl DeviceProtocol for SimulatedDriver {
    fn binding_name(&self) -> &str {
        "Simulated"
    }

    fn open_session(&mut self) -> Result<()> {
        if self.fail_session {
            return Err(ScanportError::Initialization(
                "simulated driver refused to open the session".into(),
            ));
        }
        self.session_open = true;
        self.record(|log| log.sessions_opened += 1);
        Ok(())
    }

    fn close_session(&mut self) -> Result<()> {
        self.session_open = false;
        self.record(|log| log.sessions_closed += 1);
        Ok(())
    }

    fn sources(&mut self) -> Result<Vec<DeviceSource>> {
        if !self.session_open {
            return Err(ScanportError::SessionClosed);
        }
        Ok(self.scripts.iter().map(|s| s.source.clone()).collect())
    }

    fn open_source(&mut self, source_id: &str) -> ReturnCode {
        let code = self
            .script(source_id)
            .map(|s| s.open)
            .unwrap_or(ReturnCode::Failure);
        let id = source_id.to_string();
        self.record(|log| log.opened.push(id));
        code
    }

    fn enable_source(
        &mut self,
        source_id: &str,
        mode: EnableMode,
        _window: WindowContext,
    ) -> ReturnCode {
        let Some(script) = self.script(source_id).cloned() else {
            return ReturnCode::SequenceError;
        };
        let id = source_id.to_string();
        self.record(|log| log.enabled.push((id, mode)));
        if script.enable.is_success() {
            let now = Instant::now();
            for (delay, event) in script.events {
                self.pending.push_back((now + delay, event));
            }
        }
        script.enable
    }

    fn close_source(&mut self, source_id: &str) -> ReturnCode {
        self.pending.clear();
        let id = source_id.to_string();
        self.record(|log| log.closed.push(id));
        ReturnCode::Success
    }

    fn subscribe(&mut self, sink: EventSender) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push((id, sink));
        self.record(|log| log.subscribed += 1);
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        if self.subscribers.len() == before {
            return Err(ScanportError::Transfer(format!(
                "unknown subscription {}",
                id.0
            )));
        }
        self.record(|log| log.unsubscribed += 1);
        Ok(())
    }

    fn pump(&mut self) {
        self.record(|log| log.pumps += 1);
        let now = Instant::now();
        while self.pending.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, event)) = self.pending.pop_front() {
                self.deliver(&event);
            }
        }
    }
}

/// Transfer memory that reports lock/unlock calls to the driver log.
struct SimulatedMemory {
    inner: HeapMemory,
    log: Arc<Mutex<DriverLog>>,
}

impl TransferMemory for SimulatedMemory {
    fn handle(&self) -> NativeHandle {
        self.inner.handle()
    }

    fn lock(&mut self) -> Result<()> {
        if let Ok(mut log) = self.log.lock() {
            log.locks += 1;
        }
        self.inner.lock()
    }

    fn bytes(&self) -> &[u8] {
        self.inner.bytes()
    }

    fn unlock(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.unlocks += 1;
        }
        self.inner.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_released_only_after_enable() {
        let mut driver = SimulatedDriver::new().with_source(
            SourceScript::new("flatbed").after(Duration::ZERO, ScriptedEvent::SourceDisabled),
        );
        driver.open_session().unwrap();
        let (tx, mut rx) = event_channel();
        driver.subscribe(tx);

        driver.pump();
        assert!(rx.try_recv().is_err());

        assert_eq!(driver.open_source("flatbed"), ReturnCode::Success);
        assert_eq!(
            driver.enable_source("flatbed", EnableMode::Headless, WindowContext::default()),
            ReturnCode::Success
        );
        driver.pump();
        assert!(matches!(rx.try_recv(), Ok(DeviceEvent::SourceDisabled)));
    }

    #[test]
    fn unknown_source_fails_to_open() {
        let mut driver = SimulatedDriver::new();
        driver.open_session().unwrap();
        assert_eq!(driver.open_source("missing"), ReturnCode::Failure);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut driver = SimulatedDriver::new().with_source(
            SourceScript::new("adf").after(Duration::ZERO, ScriptedEvent::SourceDisabled),
        );
        driver.open_session().unwrap();
        let (tx, mut rx) = event_channel();
        let id = driver.subscribe(tx);
        driver.unsubscribe(id).unwrap();
        driver.enable_source("adf", EnableMode::Headless, WindowContext::default());
        driver.pump();
        assert!(rx.try_recv().is_err());
        assert_eq!(driver.log().lock().unwrap().active_subscriptions(), 0);
    }

    #[test]
    fn failing_session_reports_initialization() {
        let mut driver = SimulatedDriver::new().failing_session();
        assert!(matches!(
            driver.open_session(),
            Err(ScanportError::Initialization(_))
        ));
    }
}
