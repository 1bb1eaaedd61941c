//! Server configuration.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use relp_core::{RELP_SOFTWARE, SessionConfig};
use relp_proto::codec::DEFAULT_MAX_BODY_LENGTH;

/// Default RELP port.
pub const DEFAULT_PORT: u16 = 20514;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Ignored when a listener is supplied by the caller.
    pub bind_address: SocketAddr,
    /// Expect a PROXY v1 preamble at the start of every connection
    pub proxy_protocol: bool,
    /// Time allowed from accept until `open` is acknowledged. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Largest body a frame may announce
    pub max_body_length: usize,
    /// Size of each socket read
    pub read_buffer_size: usize,
    /// Capacity of the channel from connection tasks to the dispatcher
    pub inbound_capacity: usize,
    /// How often handshake timeouts are checked
    pub tick_interval: Duration,
    /// Software identification sent in the `open` response
    pub software: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            proxy_protocol: false,
            handshake_timeout: Some(Duration::from_secs(30)),
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
            read_buffer_size: 64 * 1024,
            inbound_capacity: 1024,
            tick_interval: Duration::from_secs(1),
            software: RELP_SOFTWARE.to_string(),
        }
    }
}

impl ServerConfig {
    /// Listen on `port`, optionally restricted to `host`.
    pub fn new(port: u16, host: Option<IpAddr>) -> Self {
        let host = host.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        Self { bind_address: SocketAddr::new(host, port), ..Self::default() }
    }

    /// Per-connection session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            proxy_protocol: self.proxy_protocol,
            handshake_timeout: self.handshake_timeout,
            software: self.software.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_unspecified_host() {
        let config = ServerConfig::new(4981, None);
        assert_eq!(config.bind_address, "0.0.0.0:4981".parse().unwrap());
        assert!(!config.proxy_protocol);
    }

    #[test]
    fn session_config_follows_server_config() {
        let config = ServerConfig {
            proxy_protocol: true,
            handshake_timeout: None,
            software: "sw".to_string(),
            ..ServerConfig::new(1, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)))
        };

        let session = config.session_config();
        assert!(session.proxy_protocol);
        assert_eq!(session.handshake_timeout, None);
        assert_eq!(session.software, "sw");
    }
}
