//! `StreamSessionActor` - the streaming session orchestrator.
//!
//! Owns the whole connection lifecycle:
//!
//! ```text
//! Disconnected -> ProbingConnection -> AwaitingEncoderConfirmation
//!              -> Streaming <-> Paused
//! any failure  -> RetryScheduled or PermanentlyStopped
//! ```
//!
//! # Serialization
//!
//! The actor is the single owner of all mutable session state. Public API
//! calls, encoder events, audio chunks, the retry backoff timer, and the
//! 1-second silence tick all arrive as mailbox messages, so transitions can
//! never interleave. The reachability probe and encoder start/stop are the
//! only awaited operations and run inline on the actor task.
//!
//! # Stale callbacks
//!
//! Timer tasks capture the session `generation` at arming time and the actor
//! bumps it on every new attempt, stop, and silence disconnect. A timer that
//! fires late carries a stale generation and is discarded, so a retry armed
//! by session N can never touch session N+1. Teardown additionally cancels
//! the tasks outright.

use crate::bridge::{AudioCaptureBridge, EncoderBridge, EncoderEvent};
use crate::config::SessionConfig;
use crate::errors::StreamError;
use crate::events::{SessionState, SessionStatus, StreamEvent};
use crate::probe::{EndpointProbe, ProbeResult};
use crate::retry::{RetryDecision, RetryPolicy, RetryState};
use crate::silence::classifier;
use crate::silence::{SilenceSignal, SilenceWatchdog};

use super::messages::SessionMessage;
use super::metrics::StreamMetrics;

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Mailbox buffer: sized for a ~100ms chunk cadence plus control traffic.
const SESSION_CHANNEL_BUFFER: usize = 256;

/// Silence watchdog evaluation cadence.
const SILENCE_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a `StreamSessionActor`.
///
/// Cloneable; every method is an mpsc message plus a oneshot reply, so all
/// callers are serialized onto the actor task.
#[derive(Clone)]
pub struct StreamSessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
}

impl StreamSessionHandle {
    /// Spawn a session actor wired to the given collaborators.
    ///
    /// `encoder_events` is the inbound event channel from the encoder
    /// bridge; it is forwarded into the actor mailbox so encoder callbacks
    /// share the same serialization point as everything else.
    ///
    /// Returns the handle, the event stream (single receiver - at most one
    /// handler per event kind), and the actor task handle.
    #[must_use]
    pub fn spawn(
        encoder: Arc<dyn EncoderBridge>,
        capture: Arc<dyn AudioCaptureBridge>,
        probe: Arc<dyn EndpointProbe>,
        mut encoder_events: mpsc::Receiver<EncoderEvent>,
        metrics: Arc<StreamMetrics>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<StreamEvent>,
        JoinHandle<()>,
    ) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        // Funnel encoder events into the mailbox.
        let forward_sender = sender.clone();
        let forward_token = cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = forward_token.cancelled() => break,
                    event = encoder_events.recv() => {
                        match event {
                            Some(event) => {
                                if forward_sender
                                    .send(SessionMessage::Encoder { event })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        let actor = StreamSessionActor::new(
            receiver,
            sender.clone(),
            cancel_token.clone(),
            encoder,
            capture,
            probe,
            event_sender,
            metrics,
        );

        let task_handle = tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
            },
            event_receiver,
            task_handle,
        )
    }

    /// Start streaming with the given configuration.
    ///
    /// Rejected with [`StreamError::PermanentlyStopped`] while the retry
    /// budget is exhausted; `reset_retry_limit` re-enables starts.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration, `PermanentlyStopped` as above,
    /// `ControllerUnavailable` if the actor is gone. A start that fails
    /// after acceptance (probe, encoder) surfaces through the event stream,
    /// not through this result.
    pub async fn start_streaming(&self, config: SessionConfig) -> Result<(), StreamError> {
        self.request(|respond_to| SessionMessage::Start { config, respond_to })
            .await?
    }

    /// Stop streaming. Latches the user-stop flag: no automatic reconnect
    /// will happen until a new manual start.
    pub async fn stop_streaming(&self) -> Result<(), StreamError> {
        self.request(|respond_to| SessionMessage::Stop { respond_to })
            .await?
    }

    /// Mute the outbound gain, keeping the encoder connection alive.
    /// No-op while already paused.
    pub async fn pause_streaming(&self) -> Result<(), StreamError> {
        self.request(|respond_to| SessionMessage::Pause { respond_to })
            .await?
    }

    /// Restore the outbound gain. No-op while already streaming.
    pub async fn resume_streaming(&self) -> Result<(), StreamError> {
        self.request(|respond_to| SessionMessage::Resume { respond_to })
            .await?
    }

    /// Snapshot of the observable session status.
    pub async fn status(&self) -> Result<SessionStatus, StreamError> {
        self.request(|respond_to| SessionMessage::GetStatus { respond_to })
            .await
    }

    /// Clear the permanent-stop breaker and retry counters.
    /// Deliberately does not clear the user-stop flag.
    pub async fn reset_retry_limit(&self) -> Result<(), StreamError> {
        self.request(|respond_to| SessionMessage::ResetRetryLimit { respond_to })
            .await
    }

    /// Clear the user-stop flag ahead of a new user-initiated start.
    pub async fn reset_user_stop_flag(&self) -> Result<(), StreamError> {
        self.request(|respond_to| SessionMessage::ResetUserStopFlag { respond_to })
            .await
    }

    /// Deliver one compressed audio chunk. Non-blocking: if the mailbox is
    /// saturated the chunk is dropped (the stream tolerates gaps, a stalled
    /// caller does not).
    pub fn push_chunk(&self, payload: Bytes) {
        if let Err(e) = self.sender.try_send(SessionMessage::Chunk { payload }) {
            debug!(target: "bc.session", error = %e, "Dropping chunk, mailbox saturated");
        }
    }

    /// Shut the actor down.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check whether the actor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(tokio::sync::oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, StreamError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|e| StreamError::ControllerUnavailable(format!("mailbox send failed: {e}")))?;
        rx.await
            .map_err(|e| StreamError::ControllerUnavailable(format!("response lost: {e}")))
    }
}

/// The `StreamSessionActor` implementation.
pub struct StreamSessionActor {
    /// Mailbox.
    receiver: mpsc::Receiver<SessionMessage>,
    /// Own mailbox sender, cloned into timer tasks.
    mailbox: mpsc::Sender<SessionMessage>,
    /// Root cancellation token.
    cancel_token: CancellationToken,
    /// Out-of-process encoder control.
    encoder: Arc<dyn EncoderBridge>,
    /// Capture-side gain for pause muting.
    capture: Arc<dyn AudioCaptureBridge>,
    /// Ingest reachability probe.
    probe: Arc<dyn EndpointProbe>,
    /// Outbound event stream.
    events: mpsc::UnboundedSender<StreamEvent>,
    /// Shared metrics.
    metrics: Arc<StreamMetrics>,

    /// Lifecycle state.
    state: SessionState,
    /// Observable status, emitted on every transition.
    status: SessionStatus,
    /// Last accepted config, reused by retry attempts.
    last_config: Option<SessionConfig>,
    /// Backoff / budget / latch state.
    retry: RetryState,
    /// Silence tracking.
    watchdog: SilenceWatchdog,
    /// Latched by a silence disconnect until the next manual start.
    stopped_for_silence: bool,
    /// The encoder process has been started and not yet stopped.
    encoder_started: bool,
    /// Session token; stale timer callbacks carry an older value.
    generation: u64,
    /// Correlation id for logs and debug events, new per manual start.
    session_id: String,
    /// Pending backoff timer task.
    pending_retry: Option<JoinHandle<()>>,
    /// Silence tick task and its cancellation token.
    silence_tick: Option<(CancellationToken, JoinHandle<()>)>,
}

impl StreamSessionActor {
    #[allow(clippy::too_many_arguments)] // construction happens in one place, via spawn()
    fn new(
        receiver: mpsc::Receiver<SessionMessage>,
        mailbox: mpsc::Sender<SessionMessage>,
        cancel_token: CancellationToken,
        encoder: Arc<dyn EncoderBridge>,
        capture: Arc<dyn AudioCaptureBridge>,
        probe: Arc<dyn EndpointProbe>,
        events: mpsc::UnboundedSender<StreamEvent>,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            receiver,
            mailbox,
            cancel_token,
            encoder,
            capture,
            probe,
            events,
            metrics,
            state: SessionState::Disconnected,
            status: SessionStatus::default(),
            last_config: None,
            retry: RetryState::new(RetryPolicy::default()),
            watchdog: SilenceWatchdog::new(),
            stopped_for_silence: false,
            encoder_started: false,
            generation: 0,
            session_id: uuid::Uuid::new_v4().to_string(),
            pending_retry: None,
            silence_tick: None,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "bc.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(target: "bc.session", "StreamSessionActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "bc.session", "StreamSessionActor received cancellation signal");
                    self.teardown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(target: "bc.session", "StreamSessionActor mailbox closed, exiting");
                            self.teardown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "bc.session", "StreamSessionActor stopped");
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Start { config, respond_to } => {
                let result = self.handle_start(config).await;
                let _ = respond_to.send(result);
            }
            SessionMessage::Stop { respond_to } => {
                let result = self.handle_stop().await;
                let _ = respond_to.send(result);
            }
            SessionMessage::Pause { respond_to } => {
                let _ = respond_to.send(self.handle_pause());
            }
            SessionMessage::Resume { respond_to } => {
                let _ = respond_to.send(self.handle_resume());
            }
            SessionMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status.clone());
            }
            SessionMessage::ResetRetryLimit { respond_to } => {
                self.handle_reset_retry_limit();
                let _ = respond_to.send(());
            }
            SessionMessage::ResetUserStopFlag { respond_to } => {
                self.retry.reset_user_stop();
                debug!(target: "bc.session", session_id = %self.session_id, "User-stop flag cleared");
                let _ = respond_to.send(());
            }
            SessionMessage::Chunk { payload } => {
                self.handle_chunk(payload).await;
            }
            SessionMessage::Encoder { event } => {
                self.handle_encoder_event(event).await;
            }
            SessionMessage::RetryTimerFired { generation } => {
                self.handle_retry_timer(generation).await;
            }
            SessionMessage::SilenceTick { generation } => {
                self.handle_silence_tick(generation).await;
            }
        }
    }

    /// User-initiated start: resets per-session state, then runs an attempt.
    async fn handle_start(&mut self, config: SessionConfig) -> Result<(), StreamError> {
        if let Err(e) = config.validate() {
            self.emit(StreamEvent::Error {
                message: format!("invalid configuration: {e}"),
            });
            return Err(e.into());
        }

        // An exhausted retry budget requires an explicit reset_retry_limit.
        // A user stop latches both flags; an explicit new start clears them.
        if self.retry.is_permanently_stopped() && !self.retry.is_user_requested_stop() {
            self.emit(StreamEvent::Error {
                message: "cannot start: retry limit reached, reset required".to_string(),
            });
            return Err(StreamError::PermanentlyStopped);
        }
        self.retry.reset_user_stop();
        self.retry.reset_retry_limit();

        // A start while a session is live replaces it; the old encoder must
        // be stopped before a new one is launched.
        self.stop_encoder_best_effort().await;

        self.watchdog.reset();
        self.stopped_for_silence = false;
        self.status = SessionStatus::default();
        self.session_id = uuid::Uuid::new_v4().to_string();
        self.metrics.record_session_started();

        info!(
            target: "bc.session",
            session_id = %self.session_id,
            endpoint = %config.endpoint_url(),
            bitrate_kbps = config.bitrate_kbps,
            format = config.format.as_str(),
            "Starting streaming session"
        );

        self.begin_attempt(config, false).await;
        Ok(())
    }

    /// One connection attempt: probe, then encoder start.
    ///
    /// Shared by manual starts and scheduled retries.
    async fn begin_attempt(&mut self, config: SessionConfig, is_retry: bool) {
        self.generation += 1;
        self.cancel_pending_retry();
        self.stop_silence_tick();

        self.last_config = Some(config.clone());
        self.set_state(SessionState::ProbingConnection);
        self.emit(StreamEvent::Debug {
            message: format!(
                "{} {}",
                if is_retry { "retrying" } else { "probing" },
                config.endpoint_url()
            ),
        });

        match self.probe.probe(&config).await {
            ProbeResult::Reachable => {}
            ProbeResult::MountConflict { message } => {
                // Server is alive; proceed optimistically.
                warn!(
                    target: "bc.session",
                    session_id = %self.session_id,
                    message = %message,
                    "Mount conflict reported by probe, attempting anyway"
                );
                self.emit(StreamEvent::MountConflict { message });
            }
            ProbeResult::Unreachable { reason } => {
                self.handle_connection_lost(reason).await;
                return;
            }
        }

        match self.encoder.start(&config).await {
            Ok(()) => {
                self.encoder_started = true;
                self.set_state(SessionState::AwaitingEncoderConfirmation);
                self.start_silence_tick();
                self.emit(StreamEvent::Debug {
                    message: "encoder started, awaiting connection confirmation".to_string(),
                });
            }
            Err(e) => {
                self.handle_connection_lost(format!("encoder start failed: {e}"))
                    .await;
            }
        }
    }

    /// Single funnel for every unexpected termination: probe failure,
    /// encoder start failure, encoder crash/disconnect.
    async fn handle_connection_lost(&mut self, reason: String) {
        warn!(
            target: "bc.session",
            session_id = %self.session_id,
            reason = %reason,
            error_count = self.status.error_count + 1,
            "Connection lost"
        );

        self.status.connected = false;
        self.status.streaming = false;
        self.status.error_count += 1;
        self.status.last_error = Some(reason.clone());
        self.metrics.record_connection_lost();

        self.stop_silence_tick();
        self.stop_encoder_best_effort().await;

        self.emit(StreamEvent::ConnectionLost { reason });

        match self.retry.should_retry(Instant::now()) {
            RetryDecision::Retry { attempt, delay } => {
                self.metrics.record_retry_scheduled();
                info!(
                    target: "bc.session",
                    session_id = %self.session_id,
                    attempt,
                    max_attempts = self.retry.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                self.emit(StreamEvent::RetryAttempt {
                    attempt,
                    max_attempts: self.retry.max_attempts(),
                });
                self.set_state(SessionState::RetryScheduled);
                self.arm_retry_timer(delay);
            }
            RetryDecision::PermanentlyStop => {
                warn!(
                    target: "bc.session",
                    session_id = %self.session_id,
                    "Retry budget exhausted, stopping permanently"
                );
                self.set_state(SessionState::PermanentlyStopped);
                self.emit(StreamEvent::RetryFailed {
                    reason: format!(
                        "giving up after {} attempts; manual reset required",
                        self.retry.max_attempts()
                    ),
                });
            }
            RetryDecision::Blocked(blocked) => {
                debug!(
                    target: "bc.session",
                    session_id = %self.session_id,
                    reason = blocked.as_str(),
                    "Reconnect blocked"
                );
                self.set_state(SessionState::Disconnected);
                self.emit(StreamEvent::Error {
                    message: format!("not reconnecting: {}", blocked.as_str()),
                });
            }
        }
    }

    /// User-initiated stop: latches both stop flags so nothing restarts
    /// this session behind the user's back.
    async fn handle_stop(&mut self) -> Result<(), StreamError> {
        if self.state == SessionState::Disconnected {
            debug!(target: "bc.session", session_id = %self.session_id, "Stop requested while disconnected");
            return Ok(());
        }

        info!(target: "bc.session", session_id = %self.session_id, "Stop requested by user");

        self.retry.mark_user_stop();
        self.generation += 1;
        self.cancel_pending_retry();
        self.stop_silence_tick();
        self.stop_encoder_best_effort().await;

        self.status.connected = false;
        self.status.streaming = false;
        self.set_state(SessionState::Disconnected);
        self.emit(StreamEvent::Debug {
            message: "streaming stopped by user".to_string(),
        });
        Ok(())
    }

    fn handle_pause(&mut self) -> Result<(), StreamError> {
        match self.state {
            SessionState::Streaming => {
                // Mute the signal; the encoder connection stays up.
                self.capture.set_gain(0.0);
                // A deliberate mute ends any running silence episode so the
                // paused stretch never counts toward the safety disconnect.
                let _ = self.watchdog.on_chunk(false, Instant::now());
                self.status.streaming = false;
                self.set_state(SessionState::Paused);
                self.emit(StreamEvent::Debug {
                    message: "paused: gain muted, encoder connection kept alive".to_string(),
                });
                Ok(())
            }
            SessionState::Paused => Ok(()),
            other => Err(StreamError::InvalidState {
                operation: "pause_streaming",
                state: other,
            }),
        }
    }

    fn handle_resume(&mut self) -> Result<(), StreamError> {
        match self.state {
            SessionState::Paused => {
                self.capture.set_gain(1.0);
                self.status.streaming = true;
                self.set_state(SessionState::Streaming);
                self.emit(StreamEvent::Debug {
                    message: "resumed: gain restored".to_string(),
                });
                Ok(())
            }
            SessionState::Streaming => Ok(()),
            other => Err(StreamError::InvalidState {
                operation: "resume_streaming",
                state: other,
            }),
        }
    }

    fn handle_reset_retry_limit(&mut self) {
        self.retry.reset_retry_limit();
        if self.state == SessionState::PermanentlyStopped {
            self.set_state(SessionState::Disconnected);
        }
        debug!(target: "bc.session", session_id = %self.session_id, "Retry limit reset");
        self.emit(StreamEvent::Debug {
            message: "retry limit reset".to_string(),
        });
    }

    async fn handle_chunk(&mut self, payload: Bytes) {
        match self.state {
            SessionState::AwaitingEncoderConfirmation
            | SessionState::Streaming
            | SessionState::Paused => {
                // Classification only matters while actually streaming: a
                // muted pause produces silent chunks by design and must not
                // trip the safety disconnect.
                let silent = if self.state == SessionState::Streaming {
                    Some(classifier::is_silent(&payload))
                } else {
                    None
                };

                let len = payload.len() as u64;
                self.encoder.write_chunk(payload);
                self.status.bytes_sent += len;
                self.metrics.record_bytes_sent(len);

                if let Some(silent) = silent {
                    let signal = self.watchdog.on_chunk(silent, Instant::now());
                    if let Some(signal) = signal {
                        self.handle_silence_signal(signal).await;
                    }
                }
            }
            // Dropped while no session is up.
            _ => {}
        }
    }

    async fn handle_encoder_event(&mut self, event: EncoderEvent) {
        match event {
            EncoderEvent::Connected { message } => {
                if self.retry.is_user_requested_stop() || self.stopped_for_silence {
                    debug!(
                        target: "bc.session",
                        session_id = %self.session_id,
                        "Ignoring encoder Connected, stop already in progress"
                    );
                    return;
                }
                if self.state != SessionState::AwaitingEncoderConfirmation {
                    debug!(
                        target: "bc.session",
                        session_id = %self.session_id,
                        state = %self.state,
                        "Ignoring encoder Connected in unexpected state"
                    );
                    return;
                }

                info!(
                    target: "bc.session",
                    session_id = %self.session_id,
                    message = %message,
                    "Encoder confirmed ingest connection"
                );
                self.status.connected = true;
                self.status.streaming = true;
                self.retry.record_success();
                self.metrics.record_connection_established();
                self.set_state(SessionState::Streaming);
                self.emit(StreamEvent::Debug {
                    message: format!("encoder connected: {message}"),
                });
            }

            EncoderEvent::Disconnected { exit_code, reason } => {
                if self.retry.is_user_requested_stop()
                    || self.stopped_for_silence
                    || matches!(
                        self.state,
                        SessionState::Disconnected
                            | SessionState::PermanentlyStopped
                            | SessionState::RetryScheduled
                    )
                {
                    debug!(
                        target: "bc.session",
                        session_id = %self.session_id,
                        exit_code,
                        reason = %reason,
                        "Ignoring encoder Disconnected, shutdown or retry already in progress"
                    );
                    return;
                }

                // The process is gone either way; don't try to stop it again.
                self.encoder_started = false;

                if exit_code == 0 {
                    debug!(
                        target: "bc.session",
                        session_id = %self.session_id,
                        "Encoder exited normally"
                    );
                    self.generation += 1;
                    self.stop_silence_tick();
                    self.status.connected = false;
                    self.status.streaming = false;
                    self.set_state(SessionState::Disconnected);
                    self.emit(StreamEvent::Debug {
                        message: "encoder exited normally".to_string(),
                    });
                } else {
                    self.handle_connection_lost(format!(
                        "encoder disconnected: {reason} (exit code {exit_code})"
                    ))
                    .await;
                }
            }

            EncoderEvent::Error { kind, message } => {
                warn!(
                    target: "bc.session",
                    session_id = %self.session_id,
                    kind = %kind,
                    message = %message,
                    "Encoder reported an error"
                );
                self.emit(StreamEvent::Error {
                    message: format!("encoder error [{kind}]: {message}"),
                });
            }
        }
    }

    async fn handle_retry_timer(&mut self, generation: u64) {
        if generation != self.generation {
            debug!(
                target: "bc.session",
                session_id = %self.session_id,
                stale = generation,
                current = self.generation,
                "Discarding stale retry timer"
            );
            return;
        }
        if self.state != SessionState::RetryScheduled || self.retry.is_blocked() {
            debug!(
                target: "bc.session",
                session_id = %self.session_id,
                state = %self.state,
                "Retry timer fired but no retry is due"
            );
            return;
        }

        self.pending_retry = None;
        let Some(config) = self.last_config.clone() else {
            warn!(target: "bc.session", session_id = %self.session_id, "Retry fired without a config");
            self.set_state(SessionState::Disconnected);
            return;
        };
        self.begin_attempt(config, true).await;
    }

    async fn handle_silence_tick(&mut self, generation: u64) {
        if generation != self.generation || self.state != SessionState::Streaming {
            return;
        }
        let signal = self.watchdog.on_tick(Instant::now());
        if let Some(signal) = signal {
            self.handle_silence_signal(signal).await;
        }
    }

    async fn handle_silence_signal(&mut self, signal: SilenceSignal) {
        match signal {
            SilenceSignal::Warn { seconds_remaining } => {
                warn!(
                    target: "bc.session",
                    session_id = %self.session_id,
                    seconds_remaining,
                    "Prolonged silence, disconnect imminent"
                );
                self.emit(StreamEvent::SilenceWarning { seconds_remaining });
            }
            SilenceSignal::Disconnect => {
                warn!(
                    target: "bc.session",
                    session_id = %self.session_id,
                    "Silence threshold exceeded, disconnecting"
                );
                // Like a user stop, but the user-stop flag stays clear so a
                // fresh manual start works; the silence latch suppresses any
                // repeat until then.
                self.stopped_for_silence = true;
                self.metrics.record_silence_disconnect();
                self.emit(StreamEvent::SilenceDisconnect);

                self.generation += 1;
                self.cancel_pending_retry();
                self.stop_silence_tick();
                self.stop_encoder_best_effort().await;

                self.status.connected = false;
                self.status.streaming = false;
                self.set_state(SessionState::Disconnected);
            }
        }
    }

    /// Record and emit a state transition with a full status snapshot.
    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!(
            target: "bc.session",
            session_id = %self.session_id,
            from = %self.state,
            to = %next,
            "Session state transition"
        );
        self.state = next;
        self.emit(StreamEvent::StatusChanged {
            state: next,
            status: self.status.clone(),
        });
    }

    fn emit(&self, event: StreamEvent) {
        // The host may have dropped its receiver; that is its choice.
        let _ = self.events.send(event);
    }

    fn arm_retry_timer(&mut self, delay: Duration) {
        let generation = self.generation;
        let sender = self.mailbox.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender
                .send(SessionMessage::RetryTimerFired { generation })
                .await;
        });
        self.pending_retry = Some(handle);
    }

    fn cancel_pending_retry(&mut self) {
        if let Some(handle) = self.pending_retry.take() {
            handle.abort();
        }
    }

    fn start_silence_tick(&mut self) {
        let generation = self.generation;
        let sender = self.mailbox.clone();
        let token = self.cancel_token.child_token();
        let tick_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SILENCE_TICK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = tick_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if sender
                            .send(SessionMessage::SilenceTick { generation })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });
        self.silence_tick = Some((token, handle));
    }

    fn stop_silence_tick(&mut self) {
        if let Some((token, _handle)) = self.silence_tick.take() {
            token.cancel();
        }
    }

    async fn stop_encoder_best_effort(&mut self) {
        if !self.encoder_started {
            return;
        }
        self.encoder_started = false;
        if let Err(e) = self.encoder.stop().await {
            debug!(
                target: "bc.session",
                session_id = %self.session_id,
                error = %e,
                "Encoder stop failed (ignored)"
            );
        }
    }

    async fn teardown(&mut self) {
        self.generation += 1;
        self.cancel_pending_retry();
        self.stop_silence_tick();
        self.stop_encoder_best_effort().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bridge::mock::{MockAudioCapture, MockEncoderBridge};
    use crate::config::StreamFormat;
    use crate::probe::mock::ScriptedProbe;
    use secrecy::SecretString;

    fn test_config() -> SessionConfig {
        SessionConfig {
            host: "ingest.example.com".to_string(),
            port: 8000,
            use_tls: false,
            mount: "/live".to_string(),
            username: "source".to_string(),
            password: SecretString::from("test"),
            bitrate_kbps: 192,
            format: StreamFormat::Mp3,
            stream_name: "test".to_string(),
        }
    }

    struct Harness {
        handle: StreamSessionHandle,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        encoder: Arc<MockEncoderBridge>,
        capture: Arc<MockAudioCapture>,
        encoder_events: mpsc::Sender<EncoderEvent>,
    }

    fn spawn_with_probe(probe: ScriptedProbe) -> Harness {
        let encoder = Arc::new(MockEncoderBridge::new());
        let capture = Arc::new(MockAudioCapture::new());
        let (encoder_events, encoder_events_rx) = mpsc::channel(16);
        let (handle, events, _task) = StreamSessionHandle::spawn(
            Arc::clone(&encoder) as Arc<dyn EncoderBridge>,
            Arc::clone(&capture) as Arc<dyn AudioCaptureBridge>,
            Arc::new(probe),
            encoder_events_rx,
            StreamMetrics::new(),
        );
        Harness {
            handle,
            events,
            encoder,
            capture,
            encoder_events,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let mut harness = spawn_with_probe(ScriptedProbe::reachable());
        let mut config = test_config();
        config.host = String::new();

        let result = harness.handle.start_streaming(config).await;
        assert!(matches!(result, Err(StreamError::Config(_))));

        settle().await;
        let event = harness.events.try_recv().unwrap();
        assert!(matches!(event, StreamEvent::Error { .. }));

        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_start_reaches_awaiting_confirmation() {
        let mut harness = spawn_with_probe(ScriptedProbe::reachable());

        harness
            .handle
            .start_streaming(test_config())
            .await
            .unwrap();
        settle().await;

        assert_eq!(harness.encoder.start_calls(), 1);

        let mut states = Vec::new();
        while let Ok(event) = harness.events.try_recv() {
            if let StreamEvent::StatusChanged { state, .. } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                SessionState::ProbingConnection,
                SessionState::AwaitingEncoderConfirmation,
            ]
        );

        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_connected_confirmation_enters_streaming() {
        let mut harness = spawn_with_probe(ScriptedProbe::reachable());

        harness
            .handle
            .start_streaming(test_config())
            .await
            .unwrap();
        harness
            .encoder_events
            .send(EncoderEvent::Connected {
                message: "connected to ingest".to_string(),
            })
            .await
            .unwrap();
        settle().await;

        let status = harness.handle.status().await.unwrap();
        assert!(status.connected);
        assert!(status.streaming);

        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_pause_outside_streaming_is_invalid() {
        let harness = spawn_with_probe(ScriptedProbe::reachable());

        let result = harness.handle.pause_streaming().await;
        assert!(matches!(
            result,
            Err(StreamError::InvalidState {
                operation: "pause_streaming",
                ..
            })
        ));

        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_pause_and_resume_drive_gain() {
        let mut harness = spawn_with_probe(ScriptedProbe::reachable());

        harness
            .handle
            .start_streaming(test_config())
            .await
            .unwrap();
        harness
            .encoder_events
            .send(EncoderEvent::Connected {
                message: "ok".to_string(),
            })
            .await
            .unwrap();
        settle().await;

        harness.handle.pause_streaming().await.unwrap();
        let status = harness.handle.status().await.unwrap();
        assert!(status.connected);
        assert!(!status.streaming);
        assert_eq!(harness.capture.current_gain(), Some(0.0));

        harness.handle.resume_streaming().await.unwrap();
        let status = harness.handle.status().await.unwrap();
        assert!(status.streaming);
        assert_eq!(harness.capture.current_gain(), Some(1.0));

        // Pause never stops the encoder.
        assert_eq!(harness.encoder.stop_calls(), 0);

        let _ = harness.events.try_recv();
        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_restart_while_live_stops_previous_encoder() {
        let mut harness = spawn_with_probe(ScriptedProbe::reachable());

        harness
            .handle
            .start_streaming(test_config())
            .await
            .unwrap();
        harness
            .encoder_events
            .send(EncoderEvent::Connected {
                message: "ok".to_string(),
            })
            .await
            .unwrap();
        settle().await;

        // Restart with a live session: the old encoder is stopped before
        // the new one launches.
        harness
            .handle
            .start_streaming(test_config())
            .await
            .unwrap();
        settle().await;

        assert_eq!(harness.encoder.start_calls(), 2);
        assert_eq!(harness.encoder.stop_calls(), 1);

        // Fresh session, fresh status.
        let status = harness.handle.status().await.unwrap();
        assert_eq!(status.bytes_sent, 0);
        assert!(!status.connected);

        let _ = harness.events.try_recv();
        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_stop_while_disconnected_is_noop() {
        let harness = spawn_with_probe(ScriptedProbe::reachable());
        assert!(harness.handle.stop_streaming().await.is_ok());
        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_chunks_are_forwarded_and_counted() {
        let mut harness = spawn_with_probe(ScriptedProbe::reachable());

        harness
            .handle
            .start_streaming(test_config())
            .await
            .unwrap();
        harness
            .encoder_events
            .send(EncoderEvent::Connected {
                message: "ok".to_string(),
            })
            .await
            .unwrap();
        settle().await;

        let chunk: Bytes = (0..500u32).map(|i| (i % 251) as u8).collect();
        harness.handle.push_chunk(chunk.clone());
        harness.handle.push_chunk(chunk);
        settle().await;

        let status = harness.handle.status().await.unwrap();
        assert_eq!(status.bytes_sent, 1000);
        assert_eq!(harness.encoder.bytes_written(), 1000);

        let _ = harness.events.try_recv();
        harness.handle.cancel();
    }
}
