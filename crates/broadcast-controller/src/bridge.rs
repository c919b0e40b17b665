//! External collaborator seams.
//!
//! The controller never reaches into ambient global state: the out-of-process
//! encoder and the audio-capture gain are injected at construction as trait
//! objects. Encoder-side events (connect confirmation, crash, disconnect)
//! arrive on an mpsc channel handed to the controller at spawn so that every
//! asynchronous source is funneled through the one actor mailbox.

use crate::config::SessionConfig;
use crate::errors::StreamError;
use bytes::Bytes;

/// Event emitted by the native encoder process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Encoder confirmed its connection to the ingest server.
    Connected { message: String },
    /// Encoder process went away. `exit_code == 0` is a normal exit.
    Disconnected { exit_code: i32, reason: String },
    /// Encoder reported a non-fatal error.
    Error { kind: String, message: String },
}

/// Control channel to the native encoder process.
///
/// `start`/`stop` may block or await; `write_chunk` must not.
#[async_trait::async_trait]
pub trait EncoderBridge: Send + Sync {
    /// Start the encoder against the given ingest endpoint.
    async fn start(&self, config: &SessionConfig) -> Result<(), StreamError>;

    /// Stop the encoder process.
    async fn stop(&self) -> Result<(), StreamError>;

    /// Hand one compressed chunk to the encoder. Fire and forget.
    fn write_chunk(&self, chunk: Bytes);
}

/// Output-gain control on the audio-capture collaborator.
///
/// Pause mutes the outbound signal to 0.0 while the encoder connection stays
/// up; resume restores 1.0.
pub trait AudioCaptureBridge: Send + Sync {
    /// Set the outbound gain (0.0 to 1.0).
    fn set_gain(&self, gain: f32);
}

/// Mock collaborators for unit and integration testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock encoder: records calls, optionally fails `start`.
    #[derive(Default)]
    pub struct MockEncoderBridge {
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
        bytes_written: AtomicU64,
        fail_start: AtomicBool,
    }

    impl MockEncoderBridge {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent `start` call fail.
        pub fn fail_start(&self, fail: bool) {
            self.fail_start.store(fail, Ordering::SeqCst);
        }

        #[must_use]
        pub fn start_calls(&self) -> usize {
            self.start_calls.load(Ordering::SeqCst)
        }

        #[must_use]
        pub fn stop_calls(&self) -> usize {
            self.stop_calls.load(Ordering::SeqCst)
        }

        #[must_use]
        pub fn bytes_written(&self) -> u64 {
            self.bytes_written.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl EncoderBridge for MockEncoderBridge {
        async fn start(&self, _config: &SessionConfig) -> Result<(), StreamError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(StreamError::Encoder("mock start failure".to_string()));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<(), StreamError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn write_chunk(&self, chunk: Bytes) {
            self.bytes_written
                .fetch_add(chunk.len() as u64, Ordering::SeqCst);
        }
    }

    /// Mock capture bridge: records every gain change.
    #[derive(Default)]
    pub struct MockAudioCapture {
        gain_history: Mutex<Vec<f32>>,
    }

    impl MockAudioCapture {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All gain values set so far, in order.
        #[must_use]
        pub fn gain_history(&self) -> Vec<f32> {
            self.gain_history
                .lock()
                .map(|history| history.clone())
                .unwrap_or_default()
        }

        /// Most recent gain value, if any was set.
        #[must_use]
        pub fn current_gain(&self) -> Option<f32> {
            self.gain_history
                .lock()
                .ok()
                .and_then(|history| history.last().copied())
        }
    }

    impl AudioCaptureBridge for MockAudioCapture {
        fn set_gain(&self, gain: f32) {
            if let Ok(mut history) = self.gain_history.lock() {
                history.push(gain);
            }
        }
    }
}
