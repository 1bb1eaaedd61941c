//! Wire format for RELP (Reliable Event Logging Protocol).
//!
//! A RELP frame is a line-oriented header followed by a counted body:
//!
//! ```text
//! txnr SP command [SP datalen SP data] LF
//! ```
//!
//! The body is length-prefixed rather than line-terminated, so it may contain
//! embedded newlines (multi-line log records, handshake offers). Frames arrive
//! over TCP in arbitrary fragments; [`RelpCodec`] reassembles them
//! incrementally and never re-parses a header field once it has been resolved.
//!
//! When a connection sits behind a TCP load balancer, the first line on the
//! socket may be a PROXY protocol v1 preamble. [`ProxyV1`] strips it and
//! reports the original client address.
//!
//! # Security
//!
//! Every header token has a hard length cap (9 digits for numbers, 32 bytes for
//! the command), and announced body lengths above the codec's configured
//! maximum are rejected before any body bytes are buffered. A framing error is
//! fatal: the stream has lost synchronization and the caller must drop the
//! connection.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod errors;
pub mod message;
pub mod preamble;

pub use codec::{FrameCodec, Progress, RelpCodec};
pub use errors::{ParseError, PreambleError, Result};
pub use message::{Command, Message, PartialMessage, SocketId};
pub use preamble::{PreambleCodec, ProxyHeader, ProxyV1};
