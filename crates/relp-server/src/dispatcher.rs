//! Dispatcher: the single task that owns every connection's protocol state.
//!
//! # Architecture
//!
//! ```text
//!   listener ──accept──> Dispatcher <──Request── Server handle(s)
//!                         │   ^  │
//!            Outbound     │   │  └──ServerEvent──> consumer
//!                         v   │ Inbound
//!                    ConnectionTask (one per socket)
//! ```
//!
//! The dispatcher holds the connection registry, each connection's frame
//! codec and [`Session`], and the paused flag. Nothing else touches them, so
//! there are no locks. Acknowledgments from the consumer arrive as requests
//! over a channel and are answered through a oneshot.
//!
//! Frames are extracted one at a time. Connections with buffered input sit in
//! a run queue; the dispatcher takes one frame from the front connection,
//! requeues it at the back and yields before looking at the next. Requests
//! (`ack`, `pause`, ...) are serviced between any two frames, and frames from
//! a single connection are always handled in arrival order.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    time::Duration,
};

use bytes::Bytes;
use relp_core::{Listener, Session, SessionAction, SessionState};
use relp_proto::{Command, FrameCodec, Message, PreambleCodec, ProxyHeader, SocketId};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::{
    config::ServerConfig,
    connection::{ConnectionTask, Inbound, Outbound},
    error::ConnectionError,
    event::{ConnectionInfo, ServerEvent},
};

/// Back-off after a failed accept, so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Requests from [`crate::Server`] handles.
#[derive(Debug)]
pub(crate) enum Request {
    /// Send a response for `transaction_id` on `socket_id`
    Respond {
        socket_id: SocketId,
        transaction_id: u32,
        body: String,
        close: bool,
        reply: oneshot::Sender<bool>,
    },
    Pause {
        reply: oneshot::Sender<bool>,
    },
    Resume {
        reply: oneshot::Sender<bool>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

struct ConnectionEntry<C> {
    info: ConnectionInfo,
    session: Session,
    codec: C,
    outbound: mpsc::UnboundedSender<Outbound>,
    /// In the run queue
    scheduled: bool,
    /// `End` or `Destroy` already sent; nothing more may be written
    ending: bool,
}

/// Channels shared between the dispatcher and the handle that spawned it.
pub(crate) struct Channels {
    pub(crate) requests: mpsc::UnboundedReceiver<Request>,
    pub(crate) events: mpsc::UnboundedSender<ServerEvent>,
}

pub(crate) struct Dispatcher<L, C, P, F> {
    listener: L,
    config: ServerConfig,
    preamble: P,
    new_codec: F,
    connections: HashMap<SocketId, ConnectionEntry<C>>,
    runnable: VecDeque<SocketId>,
    next_socket_id: u64,
    paused: bool,
    /// When the current pause started
    paused_at: Option<std::time::Instant>,
    paused_tx: watch::Sender<bool>,
    requests: mpsc::UnboundedReceiver<Request>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl<L, C, P, F> Dispatcher<L, C, P, F>
where
    L: Listener,
    C: FrameCodec,
    P: PreambleCodec,
    F: Fn() -> C + Send + 'static,
{
    pub(crate) fn new(
        listener: L,
        config: ServerConfig,
        preamble: P,
        new_codec: F,
        channels: Channels,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (paused_tx, _) = watch::channel(false);

        Self {
            listener,
            config,
            preamble,
            new_codec,
            connections: HashMap::new(),
            runnable: VecDeque::new(),
            next_socket_id: 1,
            paused: false,
            paused_at: None,
            paused_tx,
            requests: channels.requests,
            inbound_tx,
            inbound_rx,
            events: channels.events,
        }
    }

    /// Run until closed, or until every [`crate::Server`] handle is dropped.
    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.tick_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let can_step = !self.paused && !self.runnable.is_empty();

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.register(stream, peer),
                    Err(error) => {
                        warn!(%error, "accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    },
                },

                Some(inbound) = self.inbound_rx.recv() => self.handle_inbound(inbound),

                request = self.requests.recv() => {
                    let Some(request) = request else {
                        self.shutdown();
                        break;
                    };
                    if !self.handle_request(request) {
                        break;
                    }
                },

                _ = ticker.tick() => self.tick(Instant::now().into_std()),

                () = std::future::ready(()), if can_step => self.step().await,
            }
        }
    }

    fn register(&mut self, stream: L::Stream, peer: SocketAddr) {
        let socket_id = SocketId(self.next_socket_id);
        self.next_socket_id += 1;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let info = ConnectionInfo { socket_id, remote_address: peer, proxy: None };
        let session = Session::new(Instant::now().into_std(), self.config.session_config());

        self.connections.insert(
            socket_id,
            ConnectionEntry {
                info: info.clone(),
                session,
                codec: (self.new_codec)(),
                outbound: outbound_tx,
                scheduled: false,
                ending: false,
            },
        );

        tokio::spawn(
            ConnectionTask {
                socket_id,
                stream,
                outbound: outbound_rx,
                inbound: self.inbound_tx.clone(),
                paused: self.paused_tx.subscribe(),
                read_buffer_size: self.config.read_buffer_size,
            }
            .run(),
        );

        info!(%socket_id, %peer, "connection opened");
        let _ = self.events.send(ServerEvent::ConnectionOpened(info));
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Data { socket_id, bytes } => self.receive(socket_id, &bytes),
            Inbound::Closed { socket_id, error } => {
                if let Some(error) = error {
                    warn!(%socket_id, %error, "transport error");
                }
                if let Some(entry) = self.connections.remove(&socket_id) {
                    info!(%socket_id, "connection closed");
                    let _ = self.events.send(ServerEvent::ConnectionClosed(entry.info));
                }
            },
        }
    }

    /// Buffer received bytes and schedule the connection for framing.
    fn receive(&mut self, socket_id: SocketId, bytes: &Bytes) {
        let Some(entry) = self.connections.get_mut(&socket_id) else {
            return;
        };
        if entry.ending || entry.session.state() == SessionState::Closed {
            trace!(%socket_id, bytes = bytes.len(), "discarding input for closed connection");
            return;
        }

        if entry.session.preamble_complete() {
            entry.codec.consume(bytes);
        } else {
            match self.preamble.decode(bytes) {
                Ok((header, rest)) => {
                    if let Err(error) = entry.session.accept_preamble(header.clone()) {
                        warn!(%socket_id, %error, "preamble out of order");
                    }
                    entry.info.proxy = Some(header);
                    entry.codec.consume(rest);
                },
                Err(source) => {
                    let actions = entry.session.reject_preamble(&source);
                    let _ = self.events.send(ServerEvent::Error(ConnectionError::Preamble {
                        socket_id,
                        source,
                    }));
                    self.execute(socket_id, actions);
                    return;
                },
            }
        }

        self.schedule(socket_id);
    }

    fn schedule(&mut self, socket_id: SocketId) {
        if let Some(entry) = self.connections.get_mut(&socket_id)
            && !entry.scheduled
        {
            entry.scheduled = true;
            self.runnable.push_back(socket_id);
        }
    }

    /// Extract and handle at most one frame from the front of the run queue.
    async fn step(&mut self) {
        let Some(socket_id) = self.runnable.pop_front() else {
            return;
        };
        let Some(entry) = self.connections.get_mut(&socket_id) else {
            return;
        };
        entry.scheduled = false;
        if entry.ending || entry.session.state() == SessionState::Closed {
            return;
        }

        match entry.codec.next_message() {
            Ok(None) => {},
            Ok(Some(mut message)) => {
                message.socket_id = Some(socket_id);
                message.remote_address = Some(entry.info.remote_address);
                message.proxy_address = entry.info.proxy.as_ref().map(ProxyHeader::client_address);
                trace!(%socket_id, txnr = message.transaction_id, command = %message.command, "frame");

                let actions = entry.session.handle_message(message);
                self.execute(socket_id, actions);
                self.schedule(socket_id);
            },
            Err(source) => {
                warn!(%socket_id, error = %source, "framing error");
                entry.session.close();
                let _ = self.events.send(ServerEvent::Error(ConnectionError::Parse { socket_id, source }));
                self.destroy(socket_id);
            },
        }

        tokio::task::yield_now().await;
    }

    fn execute(&mut self, socket_id: SocketId, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Deliver(message) => {
                    let _ = self.events.send(ServerEvent::Message(message));
                },
                SessionAction::Respond { message, body, close } => {
                    // A handshake or close that cannot be answered cannot proceed either
                    if !self.respond(socket_id, message.transaction_id, body, close) {
                        debug!(%socket_id, txnr = message.transaction_id, "response not sendable");
                        self.destroy(socket_id);
                    }
                },
                SessionAction::Destroy { reason } => {
                    debug!(%socket_id, %reason, "destroying connection");
                    self.destroy(socket_id);
                },
            }
        }
    }

    /// Queue a response frame. Returns whether it was handed to the connection.
    fn respond(&mut self, socket_id: SocketId, transaction_id: u32, body: String, close: bool) -> bool {
        if transaction_id == 0 {
            return false;
        }
        let Some(entry) = self.connections.get_mut(&socket_id) else {
            return false;
        };
        if entry.ending {
            return false;
        }

        let response = Message::new(transaction_id, Command::Rsp, body);
        let bytes = entry.codec.serialize(&response);
        let instruction = if close { Outbound::End(bytes) } else { Outbound::Write(bytes) };
        if entry.outbound.send(instruction).is_err() {
            return false;
        }

        if close {
            entry.ending = true;
            entry.session.close();
        }
        trace!(%socket_id, txnr = transaction_id, close, "response queued");
        true
    }

    fn destroy(&mut self, socket_id: SocketId) {
        if let Some(entry) = self.connections.get_mut(&socket_id) {
            entry.session.close();
            if !entry.ending {
                entry.ending = true;
                let _ = entry.outbound.send(Outbound::Destroy);
            }
        }
    }

    /// Service one request. Returns `false` once the server has shut down.
    fn handle_request(&mut self, request: Request) -> bool {
        match request {
            Request::Respond { socket_id, transaction_id, body, close, reply } => {
                let sent = self.respond(socket_id, transaction_id, body, close);
                let _ = reply.send(sent);
            },
            Request::Pause { reply } => {
                let changed = !self.paused;
                if changed {
                    info!("pausing input");
                    self.paused = true;
                    self.paused_at = Some(Instant::now().into_std());
                    self.paused_tx.send_replace(true);
                }
                let _ = reply.send(changed);
            },
            Request::Resume { reply } => {
                let changed = self.paused;
                if changed {
                    info!("resuming input");
                    self.paused = false;
                    if let Some(paused_at) = self.paused_at.take() {
                        let now = Instant::now().into_std();
                        for entry in self.connections.values_mut() {
                            entry.session.discount_pause(paused_at, now);
                        }
                    }
                    self.paused_tx.send_replace(false);
                }
                let _ = reply.send(changed);
            },
            Request::Close { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            },
        }
        true
    }

    /// Enforce handshake timeouts. Suspended while paused, since a paused
    /// connection cannot make progress on its own.
    fn tick(&mut self, now: std::time::Instant) {
        if self.paused {
            return;
        }
        let expired: Vec<(SocketId, Vec<SessionAction>)> = self
            .connections
            .iter_mut()
            .filter(|(_, entry)| !entry.ending)
            .filter_map(|(socket_id, entry)| {
                let actions = entry.session.tick(now);
                (!actions.is_empty()).then_some((*socket_id, actions))
            })
            .collect();

        for (socket_id, actions) in expired {
            warn!(%socket_id, "handshake timed out");
            self.execute(socket_id, actions);
        }
    }

    /// Destroy every connection and stop accepting.
    fn shutdown(&mut self) {
        info!(connections = self.connections.len(), "shutting down");
        for (socket_id, entry) in self.connections.drain() {
            if !entry.ending {
                let _ = entry.outbound.send(Outbound::Destroy);
            }
            debug!(%socket_id, "connection closed by shutdown");
            let _ = self.events.send(ServerEvent::ConnectionClosed(entry.info));
        }
        self.runnable.clear();
    }
}
