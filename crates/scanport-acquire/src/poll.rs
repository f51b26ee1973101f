// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded polling for the fallback path.
//
// Two bounds are used: a time window for detecting a new file, and an
// attempt budget for waiting until that file has content. Both sleep a fixed
// interval between polls; nothing here backs off.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Attempt budget with a fixed pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Exhausted,
}

impl RetryConfig {
    /// Decide after attempt number `attempt` (1-based) came up empty.
    pub fn after_attempt(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            warn!(attempt, max = self.max_attempts, "retry limit exhausted");
            RetryDecision::Exhausted
        } else {
            debug!(attempt, delay_ms = self.interval.as_millis() as u64, "scheduling retry");
            RetryDecision::RetryAfter(self.interval)
        }
    }
}

/// Fixed-length window measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct WatchWindow {
    started: Instant,
    length: Duration,
}

impl WatchWindow {
    pub fn start(length: Duration) -> Self {
        Self {
            started: Instant::now(),
            length,
        }
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.length
    }

    pub fn length_secs(&self) -> u64 {
        self.length.as_secs()
    }

    /// Sleep at most `interval`, never past the end of the window.
    pub fn next_pause(&self, interval: Duration) -> Duration {
        interval.min(self.length.saturating_sub(self.started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_until_budget_is_spent() {
        let config = RetryConfig {
            max_attempts: 3,
            interval: Duration::from_millis(500),
        };
        assert_eq!(
            config.after_attempt(1),
            RetryDecision::RetryAfter(Duration::from_millis(500))
        );
        assert_eq!(
            config.after_attempt(2),
            RetryDecision::RetryAfter(Duration::from_millis(500))
        );
        assert_eq!(config.after_attempt(3), RetryDecision::Exhausted);
    }

    #[test]
    fn window_pause_is_clamped_to_remaining_time() {
        let window = WatchWindow::start(Duration::from_millis(100));
        assert!(window.next_pause(Duration::from_secs(5)) <= Duration::from_millis(100));
        assert!(!window.expired());

        let closed = WatchWindow::start(Duration::ZERO);
        assert!(closed.expired());
        assert_eq!(closed.next_pause(Duration::from_secs(1)), Duration::ZERO);
    }
}
