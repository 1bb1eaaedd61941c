//! Simulated listener.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use relp_core::Listener;
use relp_server::{Server, ServerConfig, ServerError, ServerEvent};
use tracing::debug;

/// Listener over turmoil's simulated TCP.
pub struct SimListener {
    inner: turmoil::net::TcpListener,
}

impl SimListener {
    /// Bind inside the current turmoil host.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let inner = turmoil::net::TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Listener for SimListener {
    type Stream = turmoil::net::TcpStream;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)> {
        self.inner.accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Run a server on `addr` whose consumer acknowledges every message.
///
/// Meant as the body of a turmoil host. Returns when the server shuts down.
pub async fn serve_acking(addr: &str, config: ServerConfig) -> Result<(), ServerError> {
    let listener = SimListener::bind(addr).await?;
    let (server, mut events) = Server::serve(listener, config)?;

    while let Some(event) = events.recv().await {
        if let ServerEvent::Message(mut message) = event {
            let acked = server.ack(&mut message, None, false).await;
            debug!(txnr = message.transaction_id, acked, "consumer handled message");
        }
    }
    Ok(())
}
