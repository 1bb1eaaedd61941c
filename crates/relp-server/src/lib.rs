//! RELP server runtime.
//!
//! Accepts TCP connections, drives each through the [`relp_core::Session`]
//! state machine and hands `syslog` records to a consumer as
//! [`ServerEvent::Message`]. The consumer acknowledges each record with
//! [`Server::ack`] (or [`Server::nack`]) once it is safely handled; until then
//! the client keeps it in its retransmission window.
//!
//! # Components
//!
//! - [`Server`]: cloneable handle for acknowledgments and flow control
//! - [`ServerEvents`]: stream of connection lifecycle events and messages
//! - [`ServerConfig`]: listener and session settings
//!
//! Protocol state for every connection is owned by a single dispatcher task;
//! sockets are serviced by one lightweight task each. See the `dispatcher`
//! module for the layout.

mod config;
mod connection;
mod dispatcher;
mod error;
mod event;
mod server;

pub use config::{DEFAULT_PORT, ServerConfig};
pub use error::{ConnectionError, ServerError};
pub use event::{ConnectionInfo, ServerEvent, ServerEvents};
pub use relp_proto::{Message, SocketId};
pub use server::Server;
