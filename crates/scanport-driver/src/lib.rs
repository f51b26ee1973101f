// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanport — scanner driver protocol bindings.
//
// Defines the `DeviceProtocol` seam the session manager drives, plus a stub
// binding for hosts without a driver subsystem and a scriptable simulated
// binding for tests and demos.

pub mod simulated;
pub mod stub;
pub mod traits;

pub use simulated::{DriverLog, ScriptedEvent, SimulatedDriver, SourceScript};
pub use stub::StubDriver;
pub use traits::{
    DeviceEvent, DeviceProtocol, EventReceiver, EventSender, SubscriptionId, WindowContext,
    event_channel,
};

/// Create the binding for the host platform.
///
/// Must be called on the session thread; the binding is not `Send`.
pub fn platform_driver() -> Box<dyn DeviceProtocol> {
    Box::new(stub::StubDriver::default())
}
