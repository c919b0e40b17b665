//! Continuous-silence tracking.
//!
//! The watchdog is fed the classifier verdict for every chunk and is also
//! evaluated on a fixed 1-second tick owned by the session actor, so a stall
//! in chunk delivery still counts as silence. It emits at most one warning
//! and one disconnect per silence episode; `disconnect_triggered` latches
//! until [`SilenceWatchdog::reset`] (a new manual streaming start), so one
//! long stretch of silence can never fire twice.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Continuous silence that triggers the safety disconnect.
pub const SILENCE_DISCONNECT_THRESHOLD: Duration = Duration::from_secs(30);

/// A warning is issued once the remaining time drops to this window.
pub const SILENCE_WARNING_WINDOW: Duration = Duration::from_secs(10);

/// Signal raised by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceSignal {
    /// Disconnect is imminent unless audio returns.
    Warn { seconds_remaining: u64 },
    /// The silence threshold has been exceeded; tear the session down.
    Disconnect,
}

/// Silence tracking state. Owned by the session actor, one per controller.
#[derive(Debug, Default)]
pub struct SilenceWatchdog {
    is_silent: bool,
    /// Set iff `is_silent`.
    silent_since: Option<Instant>,
    warning_issued: bool,
    disconnect_triggered: bool,
}

impl SilenceWatchdog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the classifier verdict for one chunk.
    pub fn on_chunk(&mut self, silent: bool, now: Instant) -> Option<SilenceSignal> {
        if silent {
            if !self.is_silent {
                debug!(target: "bc.silence", "Silence episode started");
                self.is_silent = true;
                self.silent_since = Some(now);
                self.warning_issued = false;
            }
        } else if self.is_silent {
            debug!(target: "bc.silence", "Audio resumed");
            self.is_silent = false;
            self.silent_since = None;
            self.warning_issued = false;
            // disconnect_triggered stays latched until reset().
        }
        self.evaluate(now)
    }

    /// Evaluate on the fixed 1-second tick, independent of chunk cadence.
    pub fn on_tick(&mut self, now: Instant) -> Option<SilenceSignal> {
        self.evaluate(now)
    }

    /// Clear all state, including the disconnect latch.
    ///
    /// Called on a new manual streaming start.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.is_silent
    }

    #[must_use]
    pub fn disconnect_triggered(&self) -> bool {
        self.disconnect_triggered
    }

    fn evaluate(&mut self, now: Instant) -> Option<SilenceSignal> {
        if !self.is_silent {
            return None;
        }
        let since = self.silent_since?;
        let elapsed = now.duration_since(since);

        if elapsed >= SILENCE_DISCONNECT_THRESHOLD {
            if self.disconnect_triggered {
                return None;
            }
            self.disconnect_triggered = true;
            return Some(SilenceSignal::Disconnect);
        }

        let remaining = SILENCE_DISCONNECT_THRESHOLD - elapsed;
        if remaining <= SILENCE_WARNING_WINDOW && !self.warning_issued {
            self.warning_issued = true;
            return Some(SilenceSignal::Warn {
                seconds_remaining: remaining.as_secs(),
            });
        }

        None
    }
}
