// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the scanner driver protocol.
//
// A binding is created on, and only ever called from, the session's dedicated
// thread. Asynchronous notifications are delivered by `pump` into the
// bounded channels registered with `subscribe`.

use scanport_core::error::Result;
use scanport_core::native::TransferMemory;
use scanport_core::types::{DeviceSource, EnableMode, ReturnCode};
use tokio::sync::mpsc;

/// Capacity of a transaction's notification channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

pub type EventSender = mpsc::Sender<DeviceEvent>;
pub type EventReceiver = mpsc::Receiver<DeviceEvent>;

/// Create a bounded notification channel for one transaction.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Handle returned by [`DeviceProtocol::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Parent window (or equivalent event context) for interactive dialogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowContext(pub Option<usize>);

/// Asynchronous notification from the driver.
pub enum DeviceEvent {
    /// A page is available in driver memory. The memory is released when the
    /// boxed value is dropped.
    DataTransferred(Box<dyn TransferMemory>),
    TransferError {
        code: ReturnCode,
        detail: Option<String>,
    },
    /// The source finished its acquisition cycle and disabled itself.
    SourceDisabled,
}

impl std::fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataTransferred(memory) => f
                .debug_tuple("DataTransferred")
                .field(&memory.handle())
                .finish(),
            Self::TransferError { code, detail } => f
                .debug_struct("TransferError")
                .field("code", code)
                .field("detail", detail)
                .finish(),
            Self::SourceDisabled => f.write_str("SourceDisabled"),
        }
    }
}

/// Session-oriented scanner driver protocol.
///
/// Not `Send`: the binding lives on the thread that created it.
pub trait DeviceProtocol {
    /// Human-readable binding name (e.g. "TWAIN 2.4", "Desktop (stub)").
    fn binding_name(&self) -> &str;

    /// Set up the event-delivery primitive and open the driver session.
    fn open_session(&mut self) -> Result<()>;

    fn close_session(&mut self) -> Result<()>;

    /// Enumerate the sources visible to the open session.
    fn sources(&mut self) -> Result<Vec<DeviceSource>>;

    fn open_source(&mut self, source_id: &str) -> ReturnCode;

    fn enable_source(&mut self, source_id: &str, mode: EnableMode, window: WindowContext)
    -> ReturnCode;

    fn close_source(&mut self, source_id: &str) -> ReturnCode;

    /// Register a notification sink until [`unsubscribe`](Self::unsubscribe).
    fn subscribe(&mut self, sink: EventSender) -> SubscriptionId;

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()>;

    /// Run one step of the event loop, delivering pending notifications.
    fn pump(&mut self);

    /// Parent window for interactive enable.
    fn window_context(&self) -> WindowContext {
        WindowContext::default()
    }
}
