//! Transport abstraction for the accept side of a RELP server.
//!
//! Production uses tokio's `TcpListener`, tests use turmoil's simulated TCP.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bound listening socket.
///
/// The server only ever calls `accept` from its dispatcher task, so
/// implementations need not be shareable.
#[async_trait]
pub trait Listener: Send + 'static {
    /// Byte stream of an accepted connection.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Accept an incoming connection.
    ///
    /// Must be cancel-safe: the server races it against other work.
    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Listener for tokio::net::TcpListener {
    type Stream = tokio::net::TcpStream;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)> {
        tokio::net::TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        tokio::net::TcpListener::local_addr(self)
    }
}
