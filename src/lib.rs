#![forbid(unsafe_code)]

//! `agent-relay` — relay chat messages to a stateful CLI reasoning agent.
//!
//! A WebSocket chat hub feeds a serialized job scheduler that drives one
//! external worker process at a time over a line-delimited streaming
//! protocol, publishing typed progress events back to every connected
//! client.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod hub;
pub mod models;
pub mod protocol;
pub mod scheduler;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
