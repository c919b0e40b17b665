//! Silence detection over opaque compressed audio chunks.
//!
//! Two halves: a pure per-chunk [`classifier`] and the stateful [`watchdog`]
//! that turns a run of silent chunks into a warning and, eventually, a safety
//! disconnect.

pub mod classifier;
pub mod watchdog;

pub use watchdog::{SilenceSignal, SilenceWatchdog};
