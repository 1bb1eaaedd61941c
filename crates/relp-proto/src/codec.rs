//! Incremental frame decoding and encoding.
//!
//! Decoding runs four resumable stages in strict order: transaction id,
//! command, body length, body. Each stage looks only at the bytes currently
//! buffered. When a stage cannot find its delimiter yet, decoding stops with
//! [`Progress::complete`] set to `false`; the bytes of the stages already
//! resolved are consumed into the [`PartialMessage`], and the next call picks
//! up at the first unresolved stage.
//!
//! ```text
//! "1 sys" | "log 5 hel" | "lo\n"
//!  txnr     command       body
//!           bodylen
//! ```

use bytes::{Buf, Bytes, BytesMut};

use crate::{
    errors::{ParseError, Result},
    message::{Command, Message, PartialMessage},
};

/// Maximum digits in a transaction id.
pub const TXNR_MAX_DIGITS: usize = 9;

/// Maximum bytes in a command token.
pub const COMMAND_MAX_LEN: usize = 32;

/// Maximum digits in a body length.
pub const DATALEN_MAX_DIGITS: usize = 9;

/// Default cap on announced body length (16 MB).
pub const DEFAULT_MAX_BODY_LENGTH: usize = 16 * 1024 * 1024;

/// Outcome of one decoding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Whether every stage of the frame is resolved
    pub complete: bool,
    /// Bytes consumed from the front of the buffer
    pub position: usize,
}

impl Progress {
    fn incomplete(position: usize) -> Self {
        Self { complete: false, position }
    }

    fn complete(position: usize) -> Self {
        Self { complete: true, position }
    }
}

/// Frame decoder and encoder owned by a single connection.
///
/// The server constructs one instance per connection, so implementations may
/// keep per-stream state (receive buffer, in-progress message).
pub trait FrameCodec: Send + 'static {
    /// Append newly received bytes to the receive buffer.
    fn consume(&mut self, bytes: &[u8]);

    /// Extract the next complete message from the receive buffer.
    ///
    /// Returns `Ok(None)` when the buffer holds only part of a frame. An error
    /// means framing is lost; the codec must not be used again.
    fn next_message(&mut self) -> Result<Option<Message>>;

    /// Encode a message for the wire.
    fn serialize(&self, message: &Message) -> Bytes;
}

/// RELP frame codec.
#[derive(Debug, Clone)]
pub struct RelpCodec {
    buffer: BytesMut,
    current: PartialMessage,
    max_body_length: usize,
}

impl Default for RelpCodec {
    fn default() -> Self {
        Self::with_max_body_length(DEFAULT_MAX_BODY_LENGTH)
    }
}

impl RelpCodec {
    /// Create a codec that rejects bodies longer than `max_body_length`.
    pub fn with_max_body_length(max_body_length: usize) -> Self {
        Self { buffer: BytesMut::new(), current: PartialMessage::default(), max_body_length }
    }

    /// Bytes received but not yet consumed by a resolved stage.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Try to resolve the remaining stages of `message` from `buffer`.
    ///
    /// Stages already resolved on `message` are skipped, so calling this on a
    /// complete message returns a complete [`Progress`] at position 0.
    pub fn deserialize(&self, buffer: &[u8], message: &mut PartialMessage) -> Result<Progress> {
        let mut position = 0;

        if message.transaction_id.is_none() {
            let window = window(buffer, position, TXNR_MAX_DIGITS + 1);
            let Some(end) = token_end(
                window,
                TXNR_MAX_DIGITS,
                ParseError::TransactionIdTooLong,
                ParseError::EmptyTransactionId,
            )?
            else {
                return Ok(Progress::incomplete(position));
            };

            let transaction_id = parse_digits(&window[..end])
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(ParseError::InvalidTransactionId)?;

            message.transaction_id = Some(transaction_id);
            position += end + 1;
        }

        if message.command.is_none() {
            let window = window(buffer, position, COMMAND_MAX_LEN + 1);
            let Some(end) = token_end(
                window,
                COMMAND_MAX_LEN,
                ParseError::CommandTooLong,
                ParseError::EmptyCommand,
            )?
            else {
                return Ok(Progress::incomplete(position));
            };

            let token = String::from_utf8_lossy(&window[..end]);
            message.command = Some(Command::from(token.as_ref()));
            position += end + 1;
        }

        if message.body_length.is_none() {
            let window = window(buffer, position, DATALEN_MAX_DIGITS + 1);

            // A zero length is written as a lone "0" with no trailing space or body
            if window.first() == Some(&b'0') {
                message.body_length = Some(0);
                position += 1;
            } else {
                let Some(end) = token_end(
                    window,
                    DATALEN_MAX_DIGITS,
                    ParseError::BodyLengthTooLong,
                    ParseError::EmptyBodyLength,
                )?
                else {
                    return Ok(Progress::incomplete(position));
                };

                let length = parse_digits(&window[..end]).ok_or(ParseError::InvalidBodyLength)?;
                if length > self.max_body_length {
                    return Err(ParseError::BodyTooLarge { length, max: self.max_body_length });
                }

                message.body_length = Some(length);
                position += end + 1;
            }
        }

        if message.body.is_none() {
            let Some(length) = message.body_length else {
                return Ok(Progress::incomplete(position));
            };

            let remaining = buffer.len().saturating_sub(position);
            if remaining < length + 1 {
                return Ok(Progress::incomplete(position));
            }

            if buffer[position + length] != b'\n' {
                return Err(ParseError::MissingTrailer);
            }

            let body = std::str::from_utf8(&buffer[position..position + length])
                .map_err(|_| ParseError::InvalidBody)?;

            message.body = Some(body.to_owned());
            position += length + 1;
        }

        Ok(Progress::complete(position))
    }
}

impl FrameCodec for RelpCodec {
    fn consume(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn next_message(&mut self) -> Result<Option<Message>> {
        let mut current = std::mem::take(&mut self.current);
        let progress = self.deserialize(&self.buffer, &mut current)?;

        self.buffer.advance(progress.position);

        if !progress.complete {
            self.current = current;
            return Ok(None);
        }

        Ok(current.into_message())
    }

    fn serialize(&self, message: &Message) -> Bytes {
        let txnr = message.transaction_id.to_string();
        let command = message.command.as_str();
        let mut out = BytesMut::with_capacity(txnr.len() + command.len() + message.body.len() + 16);

        out.extend_from_slice(txnr.as_bytes());
        out.extend_from_slice(b" ");
        out.extend_from_slice(command.as_bytes());

        if message.body.is_empty() {
            out.extend_from_slice(b" 0");
        } else {
            out.extend_from_slice(b" ");
            out.extend_from_slice(message.body.len().to_string().as_bytes());
            out.extend_from_slice(b" ");
            out.extend_from_slice(message.body.as_bytes());
        }

        out.extend_from_slice(b"\n");
        out.freeze()
    }
}

fn window(buffer: &[u8], start: usize, len: usize) -> &[u8] {
    let start = start.min(buffer.len());
    let end = start.saturating_add(len).min(buffer.len());
    &buffer[start..end]
}

/// Locate the space ending a header token.
///
/// `Ok(None)` means the delimiter has not arrived yet and the token is still
/// short enough to be legitimate.
fn token_end(
    window: &[u8],
    max_len: usize,
    too_long: ParseError,
    empty: ParseError,
) -> Result<Option<usize>> {
    match window.iter().position(|&b| b == b' ') {
        Some(0) => Err(empty),
        Some(end) => Ok(Some(end)),
        None if window.len() > max_len => Err(too_long),
        None => Ok(None),
    }
}

fn parse_digits(token: &[u8]) -> Option<usize> {
    if token.is_empty() || !token.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(token).ok()?.parse().ok()
}
