//! PROXY protocol v1 preamble.
//!
//! A TCP load balancer may prepend one human-readable line to the stream:
//!
//! ```text
//! PROXY TCP4 10.7.254.51 10.0.30.19 45219 5515\r\n
//! ```
//!
//! Only the first chunk received on a connection is examined. A preamble split
//! across reads is rejected rather than buffered.

use std::net::{IpAddr, SocketAddr};

use crate::errors::PreambleError;

/// Fields reported by a PROXY v1 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHeader {
    /// Protocol family (`TCP4`, `TCP6`, `UNKNOWN`)
    pub protocol: String,
    /// Original client address
    pub client_ip: String,
    /// Address of the proxy side facing the server
    pub proxy_for_ip: String,
    /// Original client port
    pub client_port: String,
    /// Port of the proxy side facing the server
    pub proxy_for_port: String,
}

impl ProxyHeader {
    /// Original client address, if the header carried a well-formed one.
    pub fn client_addr(&self) -> Option<SocketAddr> {
        let ip: IpAddr = self.client_ip.parse().ok()?;
        let port: u16 = self.client_port.parse().ok()?;
        Some(SocketAddr::new(ip, port))
    }

    /// Client address as `ip:port` text, as reported.
    pub fn client_address(&self) -> String {
        format!("{}:{}", self.client_ip, self.client_port)
    }
}

/// One-shot decoder for a connection preamble.
pub trait PreambleCodec: Send + Sync + 'static {
    /// Decode the preamble at the front of `buffer`.
    ///
    /// Returns the header and the bytes that follow it, which belong to the
    /// framed protocol.
    fn decode<'a>(&self, buffer: &'a [u8]) -> Result<(ProxyHeader, &'a [u8]), PreambleError>;
}

/// PROXY protocol v1 (text) decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyV1;

impl PreambleCodec for ProxyV1 {
    fn decode<'a>(&self, buffer: &'a [u8]) -> Result<(ProxyHeader, &'a [u8]), PreambleError> {
        let end = buffer
            .windows(2)
            .position(|pair| pair == b"\r\n")
            .ok_or(PreambleError::MissingTerminator)?;

        let line = std::str::from_utf8(&buffer[..end]).map_err(|_| PreambleError::InvalidEncoding)?;
        let parts: Vec<&str> = line.split(' ').collect();

        if parts.len() < 6 {
            return Err(PreambleError::TooFewParts(parts.len()));
        }

        if parts[0] != "PROXY" {
            return Err(PreambleError::NotProxy(parts[0].to_string()));
        }

        let header = ProxyHeader {
            protocol: parts[1].to_string(),
            client_ip: parts[2].to_string(),
            proxy_for_ip: parts[3].to_string(),
            client_port: parts[4].to_string(),
            proxy_for_port: parts[5].to_string(),
        };

        Ok((header, &buffer[end + 2..]))
    }
}
