//! Minimal RELP client for driving the server in tests.
//!
//! Speaks just enough of the client side of the protocol to open a session,
//! send records and read responses. It does no retransmission; tests that
//! need it replay records themselves.

use std::io;

use relp_proto::{Command, FrameCodec, Message, RelpCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Offers sent with `open`.
pub const DEFAULT_OFFERS: &str = "relp_version=0\nrelp_software=relp-harness\ncommands=syslog";

/// RELP client over any byte stream.
pub struct RelpClient<S> {
    stream: S,
    codec: RelpCodec,
    next_transaction_id: u32,
}

impl RelpClient<turmoil::net::TcpStream> {
    /// Connect to `addr` (e.g. `"server:20514"`) from the current turmoil host.
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = turmoil::net::TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }
}

impl<S> RelpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream, codec: RelpCodec::default(), next_transaction_id: 1 }
    }

    /// Write raw bytes, bypassing framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Send one frame with the next transaction number and return that number.
    pub async fn send(&mut self, command: Command, body: &str) -> io::Result<u32> {
        let transaction_id = self.next_transaction_id;
        self.next_transaction_id += 1;

        let bytes = self.codec.serialize(&Message::new(transaction_id, command, body));
        self.stream.write_all(&bytes).await?;
        Ok(transaction_id)
    }

    /// Read the next response. `None` once the server has closed the stream.
    pub async fn response(&mut self) -> io::Result<Option<Message>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(message) = self.codec.next_message().map_err(invalid_data)? {
                return Ok(Some(message));
            }
            match self.stream.read(&mut buf).await {
                Ok(0) => return Ok(None),
                Ok(n) => self.codec.consume(&buf[..n]),
                Err(error) if is_disconnect(&error) => return Ok(None),
                Err(error) => return Err(error),
            }
        }
    }

    /// Send `open` with [`DEFAULT_OFFERS`] and return the server's answer.
    pub async fn open(&mut self) -> io::Result<Option<Message>> {
        self.send(Command::Open, DEFAULT_OFFERS).await?;
        self.response().await
    }

    /// Send one log record and return its transaction number.
    pub async fn syslog(&mut self, record: &str) -> io::Result<u32> {
        self.send(Command::Syslog, record).await
    }

    /// Send `close` and wait for its acknowledgment.
    pub async fn close(&mut self) -> io::Result<Option<Message>> {
        self.send(Command::Close, "").await?;
        self.response().await
    }
}

fn invalid_data(error: relp_proto::ParseError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}
