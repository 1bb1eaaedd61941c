//! RELP server binary.
//!
//! Logs every received record and acknowledges it.

use std::{net::IpAddr, time::Duration};

use clap::Parser;
use relp_server::{Server, ServerConfig, ServerEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// RELP server command-line arguments
#[derive(Parser, Debug)]
#[command(name = "relp-server")]
#[command(about = "RELP server that logs and acknowledges every record")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = relp_server::DEFAULT_PORT)]
    port: u16,

    /// Expect a PROXY v1 preamble on every connection
    #[arg(long)]
    proxy: bool,

    /// Seconds allowed to complete the handshake (0 waits forever)
    #[arg(long, default_value_t = 30)]
    handshake_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig {
        proxy_protocol: args.proxy,
        handshake_timeout: (args.handshake_timeout_secs > 0)
            .then(|| Duration::from_secs(args.handshake_timeout_secs)),
        ..ServerConfig::new(args.port, Some(args.host))
    };

    let (server, mut events) = Server::bind(config).await?;
    info!(address = %server.local_addr(), "ready");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ServerEvent::Message(mut message)) => {
                    let socket_id = message.socket_id.map(|id| id.0).unwrap_or_default();
                    for line in message.body.lines() {
                        info!(socket_id, txnr = message.transaction_id, "> {line}");
                    }
                    server.ack(&mut message, None, false).await;
                },
                Some(ServerEvent::ConnectionOpened(connection)) => {
                    info!(socket_id = %connection.socket_id, peer = %connection.remote_address, "client connected");
                },
                Some(ServerEvent::ConnectionClosed(connection)) => {
                    info!(socket_id = %connection.socket_id, "client disconnected");
                },
                Some(ServerEvent::Error(error)) => warn!(%error, "connection error"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                server.close().await;
                break;
            },
        }
    }

    Ok(())
}
