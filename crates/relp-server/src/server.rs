//! Public server handle.

use std::net::SocketAddr;

use relp_core::{ACK_OK, Listener, nack_body};
use relp_proto::{FrameCodec, Message, PreambleCodec, ProxyV1, RelpCodec};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use tracing::info;

use crate::{
    config::ServerConfig,
    dispatcher::{Channels, Dispatcher, Request},
    error::ServerError,
    event::ServerEvents,
};

/// Handle to a running RELP server.
///
/// Cheap to clone. The server shuts down when [`Server::close`] is called or
/// when the last handle is dropped.
///
/// # Example
///
/// ```no_run
/// use relp_server::{Server, ServerConfig, ServerEvent};
///
/// # async fn run() -> Result<(), relp_server::ServerError> {
/// let (server, mut events) = Server::bind(ServerConfig::new(20514, None)).await?;
/// while let Some(event) = events.recv().await {
///     if let ServerEvent::Message(mut message) = event {
///         // store message.body somewhere durable, then
///         server.ack(&mut message, None, false).await;
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Server {
    requests: mpsc::UnboundedSender<Request>,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind a TCP listener to `config.bind_address` and start serving.
    pub async fn bind(config: ServerConfig) -> Result<(Self, ServerEvents), ServerError> {
        let listener = TcpListener::bind(config.bind_address).await.map_err(ServerError::Bind)?;
        Self::serve(listener, config)
    }

    /// Serve connections from an already bound listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn serve<L: Listener>(listener: L, config: ServerConfig) -> Result<(Self, ServerEvents), ServerError> {
        let max_body_length = config.max_body_length;
        Self::serve_with(listener, config, ProxyV1, move || RelpCodec::with_max_body_length(max_body_length))
    }

    /// Serve with custom frame and preamble codecs. `new_codec` is called once
    /// per accepted connection.
    pub fn serve_with<L, C, P, F>(
        listener: L,
        config: ServerConfig,
        preamble: P,
        new_codec: F,
    ) -> Result<(Self, ServerEvents), ServerError>
    where
        L: Listener,
        C: FrameCodec,
        P: PreambleCodec,
        F: Fn() -> C + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(%local_addr, proxy_protocol = config.proxy_protocol, "RELP server listening");

        let channels = Channels { requests: requests_rx, events: events_tx };
        tokio::spawn(Dispatcher::new(listener, config, preamble, new_codec, channels).run());

        Ok((Self { requests: requests_tx, local_addr }, ServerEvents::new(events_rx)))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Acknowledge `message` positively. `data` replaces the default `200 OK`
    /// body; `close` ends the connection once the response is flushed.
    ///
    /// Returns `false` without sending anything if the message was already
    /// acknowledged, has transaction number 0, or its connection is gone.
    pub async fn ack(&self, message: &mut Message, data: Option<&str>, close: bool) -> bool {
        self.respond(message, data.unwrap_or(ACK_OK).to_string(), close).await
    }

    /// Acknowledge `message` negatively with `500 <error>`, telling the client
    /// it was not accepted.
    pub async fn nack(&self, message: &mut Message, error: Option<&str>, close: bool) -> bool {
        self.respond(message, nack_body(error), close).await
    }

    async fn respond(&self, message: &mut Message, body: String, close: bool) -> bool {
        if message.is_acked() || message.transaction_id == 0 {
            return false;
        }
        let Some(socket_id) = message.socket_id else {
            return false;
        };

        let (reply, rx) = oneshot::channel();
        let request = Request::Respond { socket_id, transaction_id: message.transaction_id, body, close, reply };
        if self.requests.send(request).is_err() {
            return false;
        }

        let sent = rx.await.unwrap_or(false);
        if sent {
            message.mark_acked();
        }
        sent
    }

    /// Stop reading from every connection, current and future. Frames already
    /// received stay buffered. Returns `false` if already paused.
    pub async fn pause(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Pause { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Undo [`Server::pause`]. Buffered frames are delivered first, in order.
    /// Returns `false` if not paused.
    pub async fn resume(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Resume { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stop accepting, destroy every connection and end the event stream.
    ///
    /// Unacknowledged messages are abandoned. Idempotent.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Close { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}
