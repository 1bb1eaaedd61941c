//! Per-connection I/O task.
//!
//! Each accepted stream gets one task. It forwards whatever it reads to the
//! dispatcher and writes whatever the dispatcher tells it to. It holds no
//! protocol state: framing, the session state machine and acknowledgments all
//! live in the dispatcher.
//!
//! Reading stops while the server is paused, so unread data stays in the
//! kernel socket buffer and TCP flow control pushes back on the client.

use std::io;

use bytes::{Bytes, BytesMut};
use relp_proto::SocketId;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, watch},
};
use tracing::{debug, trace};

/// Connection task to dispatcher.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Bytes read from the socket, in order
    Data { socket_id: SocketId, bytes: Bytes },

    /// The task has finished. `error` is set when the transport failed.
    Closed { socket_id: SocketId, error: Option<io::Error> },
}

/// Dispatcher to connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Write and flush
    Write(Bytes),

    /// Write and flush, then shut down the write side and finish
    End(Bytes),

    /// Drop the stream without writing anything further
    Destroy,
}

/// I/O loop for one accepted stream.
pub(crate) struct ConnectionTask<S> {
    pub(crate) socket_id: SocketId,
    pub(crate) stream: S,
    pub(crate) outbound: mpsc::UnboundedReceiver<Outbound>,
    pub(crate) inbound: mpsc::Sender<Inbound>,
    pub(crate) paused: watch::Receiver<bool>,
    pub(crate) read_buffer_size: usize,
}

impl<S> ConnectionTask<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Run until the peer disconnects, the dispatcher ends the connection, or
    /// the transport fails. Always reports `Inbound::Closed` last.
    pub(crate) async fn run(self) {
        let Self { socket_id, stream, mut outbound, inbound, mut paused, read_buffer_size } = self;
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buffer = BytesMut::with_capacity(read_buffer_size.max(1));

        let result: io::Result<()> = loop {
            let is_paused = *paused.borrow_and_update();
            if buffer.capacity() == 0 {
                buffer.reserve(read_buffer_size.max(1));
            }

            tokio::select! {
                biased;

                instruction = outbound.recv() => match instruction {
                    Some(Outbound::Write(bytes)) => {
                        if let Err(error) = write_all(&mut writer, &bytes).await {
                            break Err(error);
                        }
                    },
                    Some(Outbound::End(bytes)) => {
                        if let Err(error) = write_all(&mut writer, &bytes).await {
                            break Err(error);
                        }
                        debug!(%socket_id, "ending connection");
                        let _ = writer.shutdown().await;
                        break Ok(());
                    },
                    Some(Outbound::Destroy) | None => {
                        debug!(%socket_id, "destroying connection");
                        break Ok(());
                    },
                },

                changed = paused.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                },

                read = reader.read_buf(&mut buffer), if !is_paused => match read {
                    Ok(0) => {
                        debug!(%socket_id, "peer closed connection");
                        break Ok(());
                    },
                    Ok(n) => {
                        trace!(%socket_id, bytes = n, "read");
                        let bytes = buffer.split().freeze();
                        if inbound.send(Inbound::Data { socket_id, bytes }).await.is_err() {
                            break Ok(());
                        }
                    },
                    Err(error) => break Err(error),
                },
            }
        };

        let _ = inbound.send(Inbound::Closed { socket_id, error: result.err() }).await;
    }
}

async fn write_all<W>(writer: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use super::*;

    struct Harness {
        peer: tokio::io::DuplexStream,
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: mpsc::Receiver<Inbound>,
        paused: watch::Sender<bool>,
    }

    fn spawn(paused: bool) -> Harness {
        let (stream, peer) = duplex(1024);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (paused_tx, paused_rx) = watch::channel(paused);

        tokio::spawn(
            ConnectionTask {
                socket_id: SocketId(7),
                stream,
                outbound: outbound_rx,
                inbound: inbound_tx,
                paused: paused_rx,
                read_buffer_size: 64,
            }
            .run(),
        );

        Harness { peer, outbound: outbound_tx, inbound: inbound_rx, paused: paused_tx }
    }

    #[tokio::test]
    async fn forwards_reads_to_dispatcher() {
        let mut harness = spawn(false);
        harness.peer.write_all(b"1 open 0\n").await.unwrap();

        match harness.inbound.recv().await.unwrap() {
            Inbound::Data { socket_id, bytes } => {
                assert_eq!(socket_id, SocketId(7));
                assert_eq!(&bytes[..], b"1 open 0\n");
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn writes_then_ends() {
        let mut harness = spawn(false);
        harness.outbound.send(Outbound::Write(Bytes::from_static(b"1 rsp 6 200 OK\n"))).unwrap();
        harness.outbound.send(Outbound::End(Bytes::from_static(b"2 rsp 0\n"))).unwrap();

        let mut received = Vec::new();
        harness.peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"1 rsp 6 200 OK\n2 rsp 0\n");

        assert!(matches!(
            harness.inbound.recv().await.unwrap(),
            Inbound::Closed { error: None, .. }
        ));
    }

    #[tokio::test]
    async fn peer_close_reports_closed() {
        let Harness { peer, mut inbound, outbound: _outbound, paused: _paused } = spawn(false);
        drop(peer);

        assert!(matches!(inbound.recv().await.unwrap(), Inbound::Closed { socket_id: SocketId(7), .. }));
    }

    #[tokio::test]
    async fn paused_connection_does_not_read() {
        let mut harness = spawn(true);
        harness.peer.write_all(b"1 syslog 1 a\n").await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(50), harness.inbound.recv()).await;
        assert!(waited.is_err(), "read while paused");

        harness.paused.send_replace(false);
        match harness.inbound.recv().await.unwrap() {
            Inbound::Data { bytes, .. } => assert_eq!(&bytes[..], b"1 syslog 1 a\n"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
