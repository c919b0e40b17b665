//! Ingest endpoint reachability probe.
//!
//! A single bounded existence check against `scheme://host:port/mount`
//! before the encoder process is started. Interpretation is deliberately
//! loose: an ingest server answers 200 or 400 for a mount that can be taken,
//! and 404 when the mount is alive but likely occupied — the caller may still
//! proceed on a conflict, it is a diagnostic rather than a hard failure.
//! The probe never retries; scheduling is the session controller's job.

use crate::config::SessionConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// Bound on the whole probe round trip.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one reachability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Server answered; the mount looks available.
    Reachable,
    /// Server answered 404: alive, mount likely occupied. Not a hard failure.
    MountConflict { message: String },
    /// Transport error, timeout, or an unexpected status.
    Unreachable { reason: String },
}

/// Reachability check seam, mockable for tests.
#[async_trait::async_trait]
pub trait EndpointProbe: Send + Sync {
    /// Check the configured mount once, bounded by [`PROBE_TIMEOUT`].
    async fn probe(&self, config: &SessionConfig) -> ProbeResult;
}

/// Production probe backed by an HTTP GET.
pub struct HttpEndpointProbe {
    client: reqwest::Client,
}

impl HttpEndpointProbe {
    /// Build a probe with its own bounded-timeout client.
    ///
    /// # Errors
    ///
    /// Returns the builder error if client construction fails (TLS backend
    /// initialization).
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .connect_timeout(PROBE_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl EndpointProbe for HttpEndpointProbe {
    async fn probe(&self, config: &SessionConfig) -> ProbeResult {
        let url = config.endpoint_url();
        debug!(target: "bc.probe", url = %url, "Probing ingest endpoint");

        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match status {
                    200 | 400 => {
                        debug!(target: "bc.probe", status, "Ingest endpoint reachable");
                        ProbeResult::Reachable
                    }
                    404 => {
                        warn!(
                            target: "bc.probe",
                            status,
                            url = %url,
                            "Mount responded 404 - server alive, mount likely occupied"
                        );
                        ProbeResult::MountConflict {
                            message: format!("mount {} answered 404", config.mount),
                        }
                    }
                    other => {
                        warn!(
                            target: "bc.probe",
                            status = other,
                            url = %url,
                            "Unexpected status from ingest endpoint"
                        );
                        ProbeResult::Unreachable {
                            reason: format!("unexpected status {other} from ingest endpoint"),
                        }
                    }
                }
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("probe timed out after {}s", PROBE_TIMEOUT.as_secs())
                } else {
                    format!("probe failed: {e}")
                };
                warn!(target: "bc.probe", url = %url, reason = %reason, "Ingest endpoint unreachable");
                ProbeResult::Unreachable { reason }
            }
        }
    }
}

/// Mock probe for unit and integration testing.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted probe: returns queued results in order, then repeats the
    /// last one (or `Reachable` if none were queued).
    pub struct ScriptedProbe {
        results: Mutex<VecDeque<ProbeResult>>,
        fallback: ProbeResult,
        call_count: AtomicUsize,
    }

    impl ScriptedProbe {
        /// A probe that always reports the endpoint reachable.
        #[must_use]
        pub fn reachable() -> Self {
            Self::with_results(Vec::new())
        }

        /// A probe that always reports the endpoint unreachable.
        #[must_use]
        pub fn unreachable(reason: &str) -> Self {
            let mut probe = Self::with_results(Vec::new());
            probe.fallback = ProbeResult::Unreachable {
                reason: reason.to_string(),
            };
            probe
        }

        /// A probe that plays back `results` in sequence.
        #[must_use]
        pub fn with_results(results: Vec<ProbeResult>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                fallback: ProbeResult::Reachable,
                call_count: AtomicUsize::new(0),
            }
        }

        /// Number of probe calls made.
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl EndpointProbe for ScriptedProbe {
        async fn probe(&self, _config: &SessionConfig) -> ProbeResult {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let next = self
                .results
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front());
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }
}
