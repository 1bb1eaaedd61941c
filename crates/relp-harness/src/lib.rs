//! Deterministic simulation harness for RELP server testing.
//!
//! Turmoil-based implementation of the [`relp_core::Listener`] trait plus a
//! small RELP client, so the real server runs unmodified over a simulated
//! network with controllable latency, partitions and time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod sim_listener;

pub use client::RelpClient;
pub use sim_listener::{SimListener, serve_acking};
