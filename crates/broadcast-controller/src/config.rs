//! Streaming session configuration.
//!
//! A [`SessionConfig`] describes one ingest endpoint and is immutable for the
//! lifetime of a connection attempt; retried attempts reuse the last accepted
//! config. The ingest password is held in a [`SecretString`] so `Debug`
//! output is redacted and the value is zeroized on drop.

use secrecy::SecretString;
use thiserror::Error;

/// Default target bitrate in kbit/s.
pub const DEFAULT_BITRATE_KBPS: u32 = 192;

/// Default ingest mount.
pub const DEFAULT_MOUNT: &str = "/live";

/// Compressed stream format handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    Mp3,
    Ogg,
    Opus,
    Aac,
}

impl StreamFormat {
    /// Format tag as passed to the encoder process.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StreamFormat::Mp3 => "mp3",
            StreamFormat::Ogg => "ogg",
            StreamFormat::Opus => "opus",
            StreamFormat::Aac => "aac",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Ingest session configuration.
///
/// Supplied by the caller on every manual start; the controller clones it for
/// retry attempts and never mutates it.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Ingest server hostname or address.
    pub host: String,

    /// Ingest server port.
    pub port: u16,

    /// Use TLS for the ingest connection and the reachability probe.
    pub use_tls: bool,

    /// Mount identifier on the ingest server (e.g. "/live").
    pub mount: String,

    /// Source username.
    pub username: String,

    /// Source password. Redacted in Debug output.
    pub password: SecretString,

    /// Target bitrate in kbit/s.
    pub bitrate_kbps: u32,

    /// Compressed stream format.
    pub format: StreamFormat,

    /// Display name announced to the ingest server.
    pub stream_name: String,
}

impl SessionConfig {
    /// Validate the configuration before an attempt is made.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for empty host/mount or zero port/bitrate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port must be non-zero".to_string()));
        }
        if self.mount.trim().is_empty() {
            return Err(ConfigError::MissingField("mount"));
        }
        if self.bitrate_kbps == 0 {
            return Err(ConfigError::InvalidValue(
                "bitrate_kbps must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Full URL of the mount, used by the reachability probe.
    ///
    /// The mount is normalized to a single leading slash.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        let mount = self.mount.trim_start_matches('/');
        format!("{scheme}://{}:{}/{mount}", self.host, self.port)
    }
}
