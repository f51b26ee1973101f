// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub binding for hosts without a scanner driver subsystem.
//
// Opening the session fails with `PlatformUnavailable`, so the session
// manager reports an initialisation error and callers use the fallback path.

use scanport_core::error::{Result, ScanportError};
use scanport_core::types::{DeviceSource, EnableMode, ReturnCode};

use crate::traits::*;

/// No-op binding returned where no driver protocol is available.
#[derive(Debug, Default)]
pub struct StubDriver {
    next_subscription: u64,
}

impl DeviceProtocol for StubDriver {
    fn binding_name(&self) -> &str {
        "Desktop (stub)"
    }

    fn open_session(&mut self) -> Result<()> {
        tracing::warn!("DeviceProtocol::open_session called on stub driver");
        Err(ScanportError::PlatformUnavailable)
    }

    fn close_session(&mut self) -> Result<()> {
        Ok(())
    }

    fn sources(&mut self) -> Result<Vec<DeviceSource>> {
        Err(ScanportError::PlatformUnavailable)
    }

    fn open_source(&mut self, _source_id: &str) -> ReturnCode {
        ReturnCode::Failure
    }

    fn enable_source(
        &mut self,
        _source_id: &str,
        _mode: EnableMode,
        _window: WindowContext,
    ) -> ReturnCode {
        ReturnCode::Failure
    }

    fn close_source(&mut self, _source_id: &str) -> ReturnCode {
        ReturnCode::Success
    }

    fn subscribe(&mut self, _sink: EventSender) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId(self.next_subscription)
    }

    fn unsubscribe(&mut self, _id: SubscriptionId) -> Result<()> {
        Ok(())
    }

    fn pump(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_session_is_unavailable() {
        let mut driver = StubDriver::default();
        assert!(matches!(
            driver.open_session(),
            Err(ScanportError::PlatformUnavailable)
        ));
        assert_eq!(driver.open_source("any"), ReturnCode::Failure);
    }
}
