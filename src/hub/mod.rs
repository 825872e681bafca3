//! WebSocket hub: the consumer-facing transport boundary.
//!
//! [`publisher`] defines the [`publisher::ProgressPublisher`] seam the
//! scheduler publishes through; [`server`] fans frames out to every
//! connected chat client and feeds inbound messages and admin commands
//! back into the scheduler.

pub mod publisher;
pub mod server;
