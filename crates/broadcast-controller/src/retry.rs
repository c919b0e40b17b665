//! Reconnect scheduling: exponential backoff, a rolling session budget, and
//! a permanent-stop circuit breaker.
//!
//! [`RetryState`] is a pure decision machine — it never sleeps or spawns
//! anything. The session actor asks [`RetryState::should_retry`] after every
//! connection loss and owns the actual timer.
//!
//! Two latches deliberately outlive individual decisions:
//!
//! - `permanently_stopped` — set when the attempt budget is exhausted (or by
//!   a user stop); cleared only by [`RetryState::reset_retry_limit`].
//! - `user_requested_stop` — set by a user stop; cleared only by
//!   [`RetryState::reset_user_stop`]. `reset_retry_limit` never touches it,
//!   so an automatic reconnect can never reactivate a session the user
//!   explicitly tore down.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Maximum connection attempts before the circuit breaker latches.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Rolling window length for the session budget.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Maximum reconnects scheduled within one rolling window.
pub const DEFAULT_WINDOW_MAX_ATTEMPTS: u32 = 5;

/// Retry policy constants, overridable for tests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempt budget before `PermanentlyStop`.
    pub max_attempts: u32,
    /// Backoff base; attempt `n` waits `base_delay * 2^(n-1)`.
    pub base_delay: Duration,
    /// Rolling window length.
    pub window: Duration,
    /// Reconnects allowed per window.
    pub window_max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            window: DEFAULT_WINDOW,
            window_max_attempts: DEFAULT_WINDOW_MAX_ATTEMPTS,
        }
    }
}

/// Why a reconnect was not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedReason {
    /// The user tore the session down; only a fresh manual start clears this.
    UserRequestedStop,
    /// The circuit breaker is latched; requires `reset_retry_limit`.
    PermanentlyStopped,
    /// The rolling window budget is spent; wait for the window to roll over.
    WindowExhausted,
}

impl BlockedReason {
    /// Operator-facing description.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BlockedReason::UserRequestedStop => "streaming was stopped by the user",
            BlockedReason::PermanentlyStopped => "retry limit reached",
            BlockedReason::WindowExhausted => "too many reconnects in the last 30 seconds",
        }
    }
}

/// Outcome of a [`RetryState::should_retry`] consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule attempt `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Budget exhausted; the breaker is now latched.
    PermanentlyStop,
    /// No retry may be scheduled right now.
    Blocked(BlockedReason),
}

/// Retry scheduler state.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    /// Consecutive failed attempts since the last success / window rollover.
    attempt: u32,
    /// Start of the current rolling window, unset until the first loss.
    window_start: Option<Instant>,
    /// Reconnects recorded in the current window.
    window_attempts: u32,
    /// Circuit breaker latch.
    permanently_stopped: bool,
    /// User stop latch.
    user_requested_stop: bool,
}

impl RetryState {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            window_start: None,
            window_attempts: 0,
            permanently_stopped: false,
            user_requested_stop: false,
        }
    }

    /// Decide whether to schedule a reconnect after a connection loss.
    ///
    /// Mutates the counters: a `Retry` decision records the attempt, and a
    /// `PermanentlyStop` decision latches the breaker.
    pub fn should_retry(&mut self, now: Instant) -> RetryDecision {
        if self.user_requested_stop {
            return RetryDecision::Blocked(BlockedReason::UserRequestedStop);
        }
        if self.permanently_stopped {
            return RetryDecision::Blocked(BlockedReason::PermanentlyStopped);
        }

        // Roll the window: counters restart once the window has expired.
        match self.window_start {
            Some(start) if now.duration_since(start) <= self.policy.window => {}
            _ => {
                self.window_start = Some(now);
                self.window_attempts = 0;
                self.attempt = 0;
            }
        }

        if self.window_attempts >= self.policy.window_max_attempts {
            debug!(
                target: "bc.retry",
                window_attempts = self.window_attempts,
                "Reconnect budget for the current window is spent"
            );
            return RetryDecision::Blocked(BlockedReason::WindowExhausted);
        }

        self.attempt += 1;
        self.window_attempts += 1;

        if self.attempt >= self.policy.max_attempts {
            self.permanently_stopped = true;
            debug!(
                target: "bc.retry",
                attempt = self.attempt,
                max_attempts = self.policy.max_attempts,
                "Attempt budget exhausted, latching permanent stop"
            );
            return RetryDecision::PermanentlyStop;
        }

        let delay = self
            .policy
            .base_delay
            .saturating_mul(1u32 << (self.attempt - 1));
        RetryDecision::Retry {
            attempt: self.attempt,
            delay,
        }
    }

    /// Reset the backoff ladder after a confirmed connection.
    ///
    /// The window counters keep accumulating so a flapping connection is
    /// still capped per window.
    pub fn record_success(&mut self) {
        self.attempt = 0;
    }

    /// Manual breaker reset: clears `permanently_stopped` and all counters.
    ///
    /// Deliberately leaves `user_requested_stop` untouched.
    pub fn reset_retry_limit(&mut self) {
        self.permanently_stopped = false;
        self.attempt = 0;
        self.window_attempts = 0;
        self.window_start = None;
    }

    /// Clear the user stop latch (a new user-initiated start only).
    pub fn reset_user_stop(&mut self) {
        self.user_requested_stop = false;
    }

    /// Latch both stops; called by a user-requested stop.
    pub fn mark_user_stop(&mut self) {
        self.user_requested_stop = true;
        self.permanently_stopped = true;
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.user_requested_stop || self.permanently_stopped
    }

    #[must_use]
    pub fn is_permanently_stopped(&self) -> bool {
        self.permanently_stopped
    }

    #[must_use]
    pub fn is_user_requested_stop(&self) -> bool {
        self.user_requested_stop
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }
}
