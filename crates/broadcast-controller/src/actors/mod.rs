//! Actor implementations.
//!
//! The crate follows a message-passing model: a single `StreamSessionActor`
//! owns all mutable session state and processes its mailbox sequentially.
//! Handles communicate with it over mpsc channels with oneshot response
//! channels for request/response calls.

pub mod messages;
pub mod metrics;
pub mod session;

pub use messages::SessionMessage;
pub use metrics::StreamMetrics;
pub use session::StreamSessionHandle;
