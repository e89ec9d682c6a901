// Bounded waiting for conditions that are polled, not signalled

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Still within the deadline; check the condition again
    Continue,
    TimedOut,
    Cancelled,
}

/// A fixed point in time after which a wait gives up.
///
/// Callers check their condition, then call [`Deadline::pause`] between
/// checks until it stops returning `Continue`.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
    interval: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration, interval: Duration) -> Self {
        Self {
            end: Instant::now() + timeout,
            interval,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.end
    }

    pub fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    /// Sleep one poll interval (never past the deadline)
    pub async fn pause(&self, cancel: &AtomicBool) -> WaitOutcome {
        if cancel.load(Ordering::SeqCst) {
            return WaitOutcome::Cancelled;
        }
        if self.expired() {
            return WaitOutcome::TimedOut;
        }

        tokio::time::sleep(self.interval.min(self.remaining())).await;

        if cancel.load(Ordering::SeqCst) {
            WaitOutcome::Cancelled
        } else if self.expired() {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Continue
        }
    }
}
