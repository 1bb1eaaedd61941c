//! RELP message model.
//!
//! A [`Message`] is one frame, inbound or outbound. Inbound messages also carry
//! bookkeeping the server attaches after parsing: which connection they
//! arrived on, the peer address, and whether they have been acknowledged.

use std::{fmt, net::SocketAddr};

/// Identifier the server assigns to a connection at accept time.
///
/// Drawn from a monotonically increasing counter and never reused, so a stale
/// id held by a consumer cannot alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// RELP command token.
///
/// Unknown tokens are kept verbatim in [`Command::Other`] so the session layer
/// can reject them as protocol violations instead of silently dropping them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Session open (client to server)
    Open,
    /// Session close (client to server)
    Close,
    /// Log record (client to server)
    Syslog,
    /// Response (server to client)
    Rsp,
    /// Anything else seen on the wire
    Other(String),
}

impl Command {
    /// Wire token for this command.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Syslog => "syslog",
            Self::Rsp => "rsp",
            Self::Other(token) => token,
        }
    }
}

impl From<&str> for Command {
    fn from(token: &str) -> Self {
        match token {
            "open" => Self::Open,
            "close" => Self::Close,
            "syslog" => Self::Syslog,
            "rsp" => Self::Rsp,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One RELP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Client-assigned transaction number. `0` cannot be acknowledged.
    pub transaction_id: u32,
    /// Command token
    pub command: Command,
    /// Body length in bytes. Always equals `body.len()`.
    pub body_length: usize,
    /// UTF-8 payload, possibly containing newlines
    pub body: String,
    /// Connection this message arrived on
    pub socket_id: Option<SocketId>,
    /// Peer address of the owning connection
    pub remote_address: Option<SocketAddr>,
    /// Original client `ip:port` reported by a PROXY preamble
    pub proxy_address: Option<String>,
    acked: bool,
}

impl Message {
    /// Create a message with `body_length` derived from `body`.
    pub fn new(transaction_id: u32, command: Command, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            transaction_id,
            command,
            body_length: body.len(),
            body,
            socket_id: None,
            remote_address: None,
            proxy_address: None,
            acked: false,
        }
    }

    /// Whether an acknowledgment has been sent for this message.
    pub fn is_acked(&self) -> bool {
        self.acked
    }

    /// Record that an acknowledgment went out.
    ///
    /// Returns `false` if the message was already acknowledged. The flag never
    /// transitions back.
    pub fn mark_acked(&mut self) -> bool {
        if self.acked {
            return false;
        }
        self.acked = true;
        true
    }
}

/// A message whose header fields are resolved one stage at a time.
///
/// The codec fills fields in order (transaction id, command, body length,
/// body). A field that is `Some` is never parsed again, which lets decoding
/// resume exactly where it stopped when more bytes arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialMessage {
    /// Resolved transaction id
    pub transaction_id: Option<u32>,
    /// Resolved command
    pub command: Option<Command>,
    /// Resolved body length
    pub body_length: Option<usize>,
    /// Resolved body
    pub body: Option<String>,
}

impl PartialMessage {
    /// Whether every stage has been resolved.
    pub fn is_complete(&self) -> bool {
        self.transaction_id.is_some()
            && self.command.is_some()
            && self.body_length.is_some()
            && self.body.is_some()
    }

    /// Convert into a [`Message`] once every stage is resolved.
    pub fn into_message(self) -> Option<Message> {
        let Self { transaction_id, command, body_length, body } = self;
        let mut message = Message::new(transaction_id?, command?, body?);
        message.body_length = body_length?;
        Some(message)
    }
}
