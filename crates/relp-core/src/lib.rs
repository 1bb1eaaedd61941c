//! RELP protocol core logic
//!
//! Pure state machine logic for a RELP server session, decoupled from I/O.
//!
//! # Architecture
//!
//! Each connection owns a [`session::Session`]. The runtime feeds it decoded
//! frames (and, in proxy mode, the decoded preamble); the session answers with
//! declarative [`session::SessionAction`]s: deliver a log record to the
//! consumer, send a response, or tear the connection down. The runtime is
//! responsible for executing them.
//!
//! Time is passed in explicitly, so handshake timeouts are tested without
//! sleeping.
//!
//! # Components
//!
//! - [`session`]: Per-connection state machine (preamble, open, ready, closed)
//! - [`offers`]: Parsing and validation of `open` offers
//! - [`transport`]: Listener abstraction (real TCP or simulated)
//! - [`error`]: Session and handshake error types

pub mod error;
pub mod offers;
pub mod session;
pub mod transport;

pub use error::{HandshakeError, SessionError};
pub use offers::{Negotiated, Offers};
pub use session::{Session, SessionAction, SessionConfig, SessionState};
pub use transport::Listener;

/// RELP protocol version this server speaks.
pub const RELP_VERSION: &str = "0";

/// Software identification reported in the `open` response.
pub const RELP_SOFTWARE: &str = concat!(
    "rust-",
    env!("CARGO_PKG_NAME"),
    ",",
    env!("CARGO_PKG_VERSION"),
    ",",
    env!("CARGO_PKG_REPOSITORY")
);

/// Commands a client may offer during `open`.
pub const RELP_COMMANDS: [&str; 3] = ["open", "close", "syslog"];

/// Default body of a positive acknowledgment.
pub const ACK_OK: &str = "200 OK";

/// Default error text of a negative acknowledgment.
pub const NACK_ERROR: &str = "Error";

/// Build the body of a negative acknowledgment.
pub fn nack_body(error: Option<&str>) -> String {
    format!("500 {}", error.unwrap_or(NACK_ERROR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants() {
        assert_eq!(RELP_VERSION, "0");
        assert_eq!(RELP_COMMANDS, ["open", "close", "syslog"]);
        assert!(RELP_SOFTWARE.starts_with("rust-relp-core,"));
    }

    #[test]
    fn nack_has_sane_default() {
        assert_eq!(nack_body(None), "500 Error");
        assert_eq!(nack_body(Some("Crazy error")), "500 Crazy error");
    }
}
