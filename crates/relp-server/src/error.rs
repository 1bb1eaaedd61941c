//! Server error types.

use std::io;

use relp_proto::{ParseError, PreambleError, SocketId};
use thiserror::Error;

/// Errors starting a server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Listener could not be bound
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    /// Listener is unusable
    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}

/// Fatal per-connection errors reported through [`crate::ServerEvent::Error`].
///
/// The connection has already been destroyed when the consumer sees one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Framing lost synchronization
    #[error("connection {socket_id}: {source}")]
    Parse {
        /// Connection the error occurred on
        socket_id: SocketId,
        /// Underlying framing error
        source: ParseError,
    },

    /// PROXY preamble could not be decoded
    #[error("connection {socket_id}: {source}")]
    Preamble {
        /// Connection the error occurred on
        socket_id: SocketId,
        /// Underlying preamble error
        source: PreambleError,
    },
}

impl ConnectionError {
    /// Connection the error occurred on.
    pub fn socket_id(&self) -> SocketId {
        match self {
            Self::Parse { socket_id, .. } | Self::Preamble { socket_id, .. } => *socket_id,
        }
    }
}
