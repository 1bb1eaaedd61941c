//! Error types for frame and preamble decoding.

use thiserror::Error;

/// Result alias for frame decoding.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Fatal framing errors.
///
/// Any of these means the peer is misbehaving, not merely slow. The codec's
/// buffer can no longer be trusted and the connection must be torn down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No space found within the first 9 bytes of the transaction id field
    #[error("expected transaction id, got something longer than 9 characters")]
    TransactionIdTooLong,

    /// Frame starts with a space
    #[error("expected transaction id, got a space instead")]
    EmptyTransactionId,

    /// Transaction id contains a non-digit
    #[error("expected transaction id to be a number, got something else")]
    InvalidTransactionId,

    /// No space found within the first 32 bytes of the command field
    #[error("expected command, got something longer than 32 characters")]
    CommandTooLong,

    /// Two consecutive spaces where the command should be
    #[error("expected command, got a space instead")]
    EmptyCommand,

    /// No space found within the first 9 bytes of the body length field
    #[error("expected body length, got something longer than 9 characters")]
    BodyLengthTooLong,

    /// Space where the body length should be
    #[error("expected body length, got a space instead")]
    EmptyBodyLength,

    /// Body length contains a non-digit
    #[error("expected body length to be a number, got something else")]
    InvalidBodyLength,

    /// Announced body exceeds the codec's limit
    #[error("body length {length} exceeds maximum {max}")]
    BodyTooLarge {
        /// Announced body length
        length: usize,
        /// Configured maximum
        max: usize,
    },

    /// Body bytes are not valid UTF-8
    #[error("expected body to be valid UTF-8")]
    InvalidBody,

    /// Byte after the body is not LF
    #[error("expected ending newline, got something else")]
    MissingTrailer,
}

/// Errors decoding a PROXY protocol v1 preamble.
///
/// All of these are fatal to the connection. No response is sent since the
/// peer is not speaking RELP yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreambleError {
    /// No CRLF in the first chunk
    #[error("expected \\r\\n but did not find one")]
    MissingTerminator,

    /// Header line has fewer than six space-separated parts
    #[error("expected 6 parts for PROXY protocol got {0}")]
    TooFewParts(usize),

    /// Header line does not start with `PROXY`
    #[error("expected PROXY protocol but got {0}")]
    NotProxy(String),

    /// Header line is not valid UTF-8
    #[error("PROXY header is not valid UTF-8")]
    InvalidEncoding,
}
