//! Worker streaming-protocol layer.
//!
//! The worker emits newline-delimited JSON records on stdout. [`codec`]
//! frames the byte stream into lines, [`event`] defines the typed events a
//! line decodes to, and [`translator`] holds the per-job decoding state
//! (turn counter, path normalization, display truncation).

pub mod codec;
pub mod event;
pub mod translator;
