//! Events delivered to the message consumer.

use std::net::SocketAddr;

use relp_proto::{Message, ProxyHeader, SocketId};
use tokio::sync::mpsc;

use crate::error::ConnectionError;

/// Identity of a registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Identifier carried by every message from this connection
    pub socket_id: SocketId,
    /// Peer address as seen by the listener
    pub remote_address: SocketAddr,
    /// PROXY header, once consumed
    pub proxy: Option<ProxyHeader>,
}

/// Something the consumer should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A connection was accepted and registered
    ConnectionOpened(ConnectionInfo),

    /// A connection is gone. Unacknowledged messages from it are abandoned;
    /// the client redelivers them after reconnecting.
    ConnectionClosed(ConnectionInfo),

    /// A `syslog` record from a ready connection. The consumer acknowledges it
    /// with [`crate::Server::ack`] once it has been handled.
    Message(Message),

    /// A connection was destroyed by a fatal decoding error
    Error(ConnectionError),
}

/// Stream of [`ServerEvent`]s.
///
/// Ends once the server has shut down.
#[derive(Debug)]
pub struct ServerEvents {
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl ServerEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ServerEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. Returns `None` after shutdown.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }
}
