//! Session actor mailbox messages.
//!
//! Every external input — public API calls, encoder events, audio chunks,
//! and the controller's own timer callbacks — is one of these variants, so
//! all state mutation happens on the single actor task.

use crate::bridge::EncoderEvent;
use crate::config::SessionConfig;
use crate::errors::StreamError;
use crate::events::SessionStatus;
use bytes::Bytes;
use tokio::sync::oneshot;

/// Message processed by the `StreamSessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// User-initiated streaming start.
    Start {
        config: SessionConfig,
        respond_to: oneshot::Sender<Result<(), StreamError>>,
    },

    /// User-initiated stop; latches the user-stop flag.
    Stop {
        respond_to: oneshot::Sender<Result<(), StreamError>>,
    },

    /// Mute the outbound gain while keeping the encoder connection alive.
    Pause {
        respond_to: oneshot::Sender<Result<(), StreamError>>,
    },

    /// Restore the outbound gain.
    Resume {
        respond_to: oneshot::Sender<Result<(), StreamError>>,
    },

    /// Snapshot of the observable status.
    GetStatus {
        respond_to: oneshot::Sender<SessionStatus>,
    },

    /// Clear the permanent-stop breaker and retry counters.
    ResetRetryLimit {
        respond_to: oneshot::Sender<()>,
    },

    /// Clear the user-stop latch (precedes a new manual start).
    ResetUserStopFlag {
        respond_to: oneshot::Sender<()>,
    },

    /// One compressed audio chunk from the capture collaborator.
    Chunk { payload: Bytes },

    /// Event forwarded from the encoder bridge channel.
    Encoder { event: EncoderEvent },

    /// Backoff timer for a scheduled reconnect elapsed.
    RetryTimerFired { generation: u64 },

    /// Fixed 1-second silence evaluation tick.
    SilenceTick { generation: u64 },
}
