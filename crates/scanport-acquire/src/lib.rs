// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanport-acquire — Image acquisition over the driver protocol, with a
// directory-watch fallback.
//
// `DriverSession` owns the binding on its own thread, `ScanOrchestrator`
// runs one transaction on that thread, `FallbackAcquisitionMonitor` watches
// the filesystem instead, and `ResultSink` shapes what callers get back.
// `ScanService` ties them together.

pub mod fallback;
pub mod orchestrator;
pub mod poll;
pub mod service;
pub mod session;
pub mod sink;
pub mod trigger;

pub use fallback::{Detection, FallbackAcquisitionMonitor, WatchState};
pub use orchestrator::ScanOrchestrator;
pub use service::ScanService;
pub use session::{DriverFactory, DriverSession};
pub use sink::ResultSink;
pub use trigger::{AcquisitionTrigger, ExternalUtilityTrigger, NoTrigger};
