//! Broadcast Controller - resilient live-audio streaming session control.
//!
//! The Broadcast Controller manages the lifecycle of a live audio stream to
//! an Icecast-style ingest server: probing the endpoint before connecting,
//! supervising an out-of-process encoder, reconnecting with exponential
//! backoff when the connection drops, and disconnecting automatically when
//! the operator streams prolonged silence.
//!
//! # Architecture
//!
//! ```text
//! Host application
//!   |  StreamSessionHandle (mpsc + oneshot)
//!   v
//! StreamSessionActor ---- owns ----> RetryState, SilenceWatchdog
//!   |            |
//!   | probe      | start/stop/write_chunk
//!   v            v
//! EndpointProbe  EncoderBridge  (+ AudioCaptureBridge for pause gain)
//! ```
//!
//! A single actor owns all mutable session state; API calls, encoder
//! events, audio chunks, and timer callbacks all arrive through its mailbox
//! and are processed sequentially. Late timer callbacks are discarded via
//! per-session generation tokens.
//!
//! # Modules
//!
//! - [`actors`]: The session actor, its mailbox messages, and metrics.
//! - [`bridge`]: Traits decoupling the controller from the encoder process
//!   and the audio capture path, with mock implementations for tests.
//! - [`config`]: Stream endpoint and encoding configuration.
//! - [`errors`]: Error types surfaced by the public API.
//! - [`events`]: Session states, status snapshots, and the event stream.
//! - [`probe`]: HTTP reachability probe for the ingest endpoint.
//! - [`retry`]: Backoff ladder, rolling retry budget, and stop latches.
//! - [`silence`]: Byte-heuristic silence classifier and disconnect watchdog.

pub mod actors;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod events;
pub mod probe;
pub mod retry;
pub mod silence;

pub use actors::{StreamMetrics, StreamSessionHandle};
pub use bridge::{AudioCaptureBridge, EncoderBridge, EncoderEvent};
pub use config::{SessionConfig, StreamFormat};
pub use errors::StreamError;
pub use events::{SessionState, SessionStatus, StreamEvent};
pub use probe::{EndpointProbe, HttpEndpointProbe, ProbeResult};
