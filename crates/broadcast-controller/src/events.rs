//! Observable session status and the typed event stream.
//!
//! The source of truth for everything a host UI renders: a [`SessionStatus`]
//! snapshot plus [`StreamEvent`] notifications delivered on a single mpsc
//! channel returned at spawn time. One receiver means at most one handler per
//! event kind, and the enum makes the contract exhaustively matchable instead
//! of a bag of optional callbacks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable session status, mutated only by the session actor.
///
/// Emitted (with the current [`SessionState`]) on every state transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Encoder has an open connection to the ingest server.
    pub connected: bool,
    /// Audio is going out (false while paused or down).
    pub streaming: bool,
    /// Total chunk bytes handed to the encoder this session.
    pub bytes_sent: u64,
    /// Connection losses observed this session.
    pub error_count: u32,
    /// Most recent failure reason, if any.
    pub last_error: Option<String>,
}

/// Session lifecycle state.
///
/// `Disconnected` is both the initial state and the terminal state of a
/// user-requested stop. Any state may fall into `RetryScheduled` or
/// `PermanentlyStopped` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    ProbingConnection,
    AwaitingEncoderConfirmation,
    Streaming,
    Paused,
    RetryScheduled,
    PermanentlyStopped,
}

impl SessionState {
    /// State name as used in logs and serialized events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::ProbingConnection => "probing_connection",
            SessionState::AwaitingEncoderConfirmation => "awaiting_encoder_confirmation",
            SessionState::Streaming => "streaming",
            SessionState::Paused => "paused",
            SessionState::RetryScheduled => "retry_scheduled",
            SessionState::PermanentlyStopped => "permanently_stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by the session controller.
///
/// Serialized with an internal `type` tag so the host can forward events over
/// its own IPC as JSON without re-mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// State transition; carries a full status snapshot.
    StatusChanged {
        state: SessionState,
        status: SessionStatus,
    },
    /// Operator-facing failure description.
    Error { message: String },
    /// Diagnostic line for the host's debug console.
    Debug { message: String },
    /// Probe saw the mount occupied (404); the attempt still proceeds.
    MountConflict { message: String },
    /// The connection went down unexpectedly.
    ConnectionLost { reason: String },
    /// A reconnect attempt has been scheduled.
    RetryAttempt { attempt: u32, max_attempts: u32 },
    /// No further reconnects will happen without manual intervention.
    RetryFailed { reason: String },
    /// Continuous silence is approaching the disconnect threshold.
    SilenceWarning { seconds_remaining: u64 },
    /// The silence watchdog tore the session down.
    SilenceDisconnect,
}
