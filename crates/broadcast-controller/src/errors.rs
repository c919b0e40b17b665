//! Broadcast controller error types.
//!
//! Every public operation returns `Result<_, StreamError>`; failures are
//! additionally surfaced on the event stream so the host UI never has to
//! catch anything crossing the controller boundary.

use crate::config::ConfigError;
use crate::events::SessionState;
use thiserror::Error;

/// Broadcast controller error type.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Session configuration was rejected before any attempt was made.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Encoder bridge call failed (start/stop).
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Operation is not valid in the current session state.
    #[error("{operation} is not valid while {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// The retry budget is exhausted; a manual `reset_retry_limit` is required.
    #[error("Streaming is permanently stopped; reset the retry limit to start again")]
    PermanentlyStopped,

    /// The controller task is gone (mailbox or response channel closed).
    #[error("Controller unavailable: {0}")]
    ControllerUnavailable(String),
}
