//! Session metrics.
//!
//! Counters are emitted through the `metrics` facade (prefix `bc_`) and
//! mirrored in atomics so tests can assert without installing a recorder.
//! The host application decides whether a Prometheus (or other) exporter is
//! installed.

use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared session metrics.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    sessions_started: AtomicU64,
    connections_established: AtomicU64,
    connections_lost: AtomicU64,
    retries_scheduled: AtomicU64,
    silence_disconnects: AtomicU64,
    bytes_sent: AtomicU64,
}

impl StreamMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A manual streaming start was accepted.
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
        counter!("bc_sessions_started_total").increment(1);
    }

    /// The encoder confirmed its ingest connection.
    pub fn record_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        counter!("bc_connections_established_total").increment(1);
    }

    /// A connection was lost unexpectedly.
    pub fn record_connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
        counter!("bc_connections_lost_total").increment(1);
    }

    /// A reconnect attempt was scheduled.
    pub fn record_retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        counter!("bc_retries_scheduled_total").increment(1);
    }

    /// The silence watchdog tore a session down.
    pub fn record_silence_disconnect(&self) {
        self.silence_disconnects.fetch_add(1, Ordering::Relaxed);
        counter!("bc_silence_disconnects_total").increment(1);
    }

    /// Chunk bytes handed to the encoder.
    pub fn record_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        counter!("bc_bytes_sent_total").increment(bytes);
    }

    #[must_use]
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connections_established(&self) -> u64 {
        self.connections_established.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connections_lost(&self) -> u64 {
        self.connections_lost.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn silence_disconnects(&self) -> u64 {
        self.silence_disconnects.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}
