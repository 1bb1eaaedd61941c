//! Session error types.

use thiserror::Error;

use crate::session::SessionState;

/// Errors from misusing the session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation not valid in the current state
    #[error("invalid state {state:?} for operation {operation}")]
    InvalidState {
        /// State the session was in
        state: SessionState,
        /// Operation that was attempted
        operation: String,
    },
}

/// Reasons an `open` offer is refused.
///
/// `Display` renders the text sent after the `500 ` status in the negative
/// acknowledgment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Client offered a different protocol version
    #[error("Insufficient version\n{required} required, {} provided", .provided.as_deref().unwrap_or("none"))]
    VersionMismatch {
        /// Version this server speaks
        required: &'static str,
        /// Version the client offered
        provided: Option<String>,
    },

    /// No `commands` offer, or an empty one
    #[error("No commands provided")]
    MissingCommands,

    /// Client offered a command this server does not support
    #[error("Invalid command\n{0} is not supported")]
    UnsupportedCommand(String),
}
