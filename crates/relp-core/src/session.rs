//! Per-connection RELP session state machine.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as a parameter (no stored clock)
//! - Methods return `Vec<SessionAction>` describing effects
//! - The server executes the actions (respond, deliver, destroy)
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────────┐ preamble ┌─────────────┐  open ok  ┌───────┐
//! │ AwaitingPreamble │─────────>│ AwaitingOpen│──────────>│ Ready │
//! └──────────────────┘          └─────────────┘           └───────┘
//!          │                          │                       │
//!          │ bad preamble / timeout   │ nack / violation      │ close / violation
//!          ↓                          ↓                       ↓
//!     ┌────────┐                 ┌────────┐              ┌────────┐
//!     │ Closed │                 │ Closed │              │ Closed │
//!     └────────┘                 └────────┘              └────────┘
//! ```
//!
//! `AwaitingPreamble` only exists in proxy mode; otherwise a session starts in
//! `AwaitingOpen`.
//!
//! # Violations
//!
//! A `syslog` before the handshake, an unknown command, or any frame after the
//! session closed destroys the connection without a response. The client
//! treats the transaction as failed and retransmits after reconnecting.

use std::time::{Duration, Instant};

use relp_proto::{Command, Message, PreambleError, ProxyHeader};
use tracing::{debug, warn};

use crate::{RELP_SOFTWARE, error::SessionError, nack_body, offers::Offers};

/// Actions returned by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Hand this log record to the consumer, which acknowledges it later
    Deliver(Message),

    /// Acknowledge `message` with `body`
    Respond {
        /// Message being acknowledged
        message: Message,
        /// Response body
        body: String,
        /// End the connection once the response is flushed
        close: bool,
    },

    /// Tear the connection down immediately, without a response
    Destroy {
        /// Reason for destroying the connection
        reason: String,
    },
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the PROXY preamble (proxy mode only)
    AwaitingPreamble,
    /// Waiting for `open`
    AwaitingOpen,
    /// Handshake complete, log records accepted
    Ready,
    /// Terminal
    Closed,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Expect a PROXY v1 preamble before any RELP traffic
    pub proxy_protocol: bool,
    /// Time allowed from accept until `open` is acknowledged. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Software identification sent in the `open` response
    pub software: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            proxy_protocol: false,
            handshake_timeout: Some(Duration::from_secs(30)),
            software: RELP_SOFTWARE.to_string(),
        }
    }
}

/// Session state machine for one connection.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    config: SessionConfig,
    accepted_at: Instant,
    proxy: Option<ProxyHeader>,
}

impl Session {
    /// Create a session for a connection accepted at `now`.
    pub fn new(now: Instant, config: SessionConfig) -> Self {
        let state = if config.proxy_protocol {
            SessionState::AwaitingPreamble
        } else {
            SessionState::AwaitingOpen
        };

        Self { state, config, accepted_at: now, proxy: None }
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// PROXY header consumed at connection start, if any.
    pub fn proxy(&self) -> Option<&ProxyHeader> {
        self.proxy.as_ref()
    }

    /// Whether the preamble stage is done (or was never required).
    pub fn preamble_complete(&self) -> bool {
        self.state != SessionState::AwaitingPreamble
    }

    /// Whether `open` has been acknowledged.
    pub fn handshake_complete(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Record a decoded PROXY preamble.
    ///
    /// # Errors
    /// Returns `InvalidState` if the session is not awaiting a preamble
    pub fn accept_preamble(&mut self, header: ProxyHeader) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingPreamble {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: "accept_preamble".to_string(),
            });
        }

        debug!(protocol = %header.protocol, client = %header.client_address(), "PROXY preamble accepted");
        self.proxy = Some(header);
        self.state = SessionState::AwaitingOpen;
        Ok(())
    }

    /// Handle a preamble that failed to decode.
    pub fn reject_preamble(&mut self, error: &PreambleError) -> Vec<SessionAction> {
        self.close();
        vec![SessionAction::Destroy { reason: format!("invalid PROXY preamble: {error}") }]
    }

    /// Handle a decoded frame.
    pub fn handle_message(&mut self, message: Message) -> Vec<SessionAction> {
        match (self.state, &message.command) {
            (SessionState::Closed, command) => {
                vec![SessionAction::Destroy { reason: format!("{command} after session closed") }]
            },
            (SessionState::AwaitingPreamble, command) => {
                self.violation(format!("{command} before PROXY preamble"))
            },
            (SessionState::AwaitingOpen, Command::Open) => self.handle_open(message),
            (SessionState::Ready, Command::Syslog) => vec![SessionAction::Deliver(message)],
            (SessionState::AwaitingOpen | SessionState::Ready, Command::Close) => {
                self.close();
                vec![SessionAction::Respond { message, body: String::new(), close: true }]
            },
            (SessionState::AwaitingOpen, Command::Syslog) => {
                self.violation("syslog before open".to_string())
            },
            (state, command) => self.violation(format!("unexpected {command} in {state:?}")),
        }
    }

    fn handle_open(&mut self, message: Message) -> Vec<SessionAction> {
        match Offers::parse(&message.body).negotiate() {
            Ok(negotiated) => {
                debug!(txnr = message.transaction_id, commands = %negotiated.commands, "open accepted");
                self.state = SessionState::Ready;
                let body = negotiated.response_body(&self.config.software);
                vec![SessionAction::Respond { message, body, close: false }]
            },
            Err(error) => {
                warn!(txnr = message.transaction_id, %error, "open rejected");
                self.close();
                let body = nack_body(Some(&error.to_string()));
                vec![SessionAction::Respond { message, body, close: true }]
            },
        }
    }

    fn violation(&mut self, reason: String) -> Vec<SessionAction> {
        warn!(%reason, "protocol violation");
        self.close();
        vec![SessionAction::Destroy { reason }]
    }

    /// Transition to Closed state
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Check if the handshake has timed out
    ///
    /// # Returns
    /// `Some(elapsed)` if timed out, `None` otherwise
    #[must_use]
    pub fn check_timeout(&self, now: Instant) -> Option<Duration> {
        let timeout = self.config.handshake_timeout?;

        match self.state {
            SessionState::AwaitingPreamble | SessionState::AwaitingOpen => {
                let elapsed = now.saturating_duration_since(self.accepted_at);
                (elapsed > timeout).then_some(elapsed)
            },
            SessionState::Ready | SessionState::Closed => None,
        }
    }

    /// Exclude a period during which input was paused from the handshake
    /// deadline. Only the part of the pause after this session was accepted
    /// counts.
    pub fn discount_pause(&mut self, paused_at: Instant, resumed_at: Instant) {
        let from = paused_at.max(self.accepted_at);
        self.accepted_at += resumed_at.saturating_duration_since(from);
    }

    /// Tick the state machine - check for handshake timeout
    pub fn tick(&mut self, now: Instant) -> Vec<SessionAction> {
        match self.check_timeout(now) {
            Some(elapsed) => {
                self.close();
                vec![SessionAction::Destroy { reason: format!("handshake timeout after {elapsed:?}") }]
            },
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(txnr: u32, body: &str) -> Message {
        Message::new(txnr, Command::Open, body)
    }

    fn ready_session(now: Instant) -> Session {
        let mut session = Session::new(now, SessionConfig::default());
        session.handle_message(open(1, "relp_version=0\ncommands=syslog"));
        assert_eq!(session.state(), SessionState::Ready);
        session
    }

    fn header() -> ProxyHeader {
        ProxyHeader {
            protocol: "TCP4".to_string(),
            client_ip: "10.7.254.51".to_string(),
            proxy_for_ip: "10.0.30.19".to_string(),
            client_port: "45219".to_string(),
            proxy_for_port: "5515".to_string(),
        }
    }

    #[test]
    fn session_lifecycle() {
        let t0 = Instant::now();
        let config = SessionConfig { software: "sw".to_string(), ..Default::default() };
        let mut session = Session::new(t0, config);
        assert_eq!(session.state(), SessionState::AwaitingOpen);
        assert!(session.preamble_complete());

        let actions = session.handle_message(open(1, "relp_version=0\ncommands=syslog"));
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.handshake_complete());
        match actions.as_slice() {
            [SessionAction::Respond { message, body, close: false }] => {
                assert_eq!(message.transaction_id, 1);
                assert_eq!(body, "200 OK relp_version=0\nrelp_software=sw\ncommands=syslog");
            },
            other => panic!("unexpected actions {other:?}"),
        }

        let actions = session.handle_message(Message::new(2, Command::Syslog, "hello"));
        assert!(matches!(actions.as_slice(), [SessionAction::Deliver(m)] if m.body == "hello"));

        let actions = session.handle_message(Message::new(3, Command::Close, ""));
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Respond { body, close: true, .. }] if body.is_empty()
        ));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn version_mismatch_nacks_and_closes() {
        let mut session = Session::new(Instant::now(), SessionConfig::default());

        let actions = session.handle_message(open(1, "relp_version=1\ncommands=syslog"));

        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.handshake_complete());
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Respond { body, close: true, .. }]
                if body == "500 Insufficient version\n0 required, 1 provided"
        ));
    }

    #[test]
    fn unsupported_command_nacks_and_closes() {
        let mut session = Session::new(Instant::now(), SessionConfig::default());

        let actions = session.handle_message(open(1, "relp_version=0\ncommands=syslog,bogus"));

        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Respond { body, close: true, .. }]
                if body == "500 Invalid command\nbogus is not supported"
        ));
    }

    #[test]
    fn syslog_before_open_destroys() {
        let mut session = Session::new(Instant::now(), SessionConfig::default());

        let actions = session.handle_message(Message::new(1, Command::Syslog, "early"));

        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(actions.as_slice(), [SessionAction::Destroy { .. }]));
    }

    #[test]
    fn unknown_command_destroys() {
        let mut session = ready_session(Instant::now());

        let actions = session.handle_message(Message::new(2, Command::from("starttls"), ""));

        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(actions.as_slice(), [SessionAction::Destroy { .. }]));
    }

    #[test]
    fn second_open_destroys() {
        let mut session = ready_session(Instant::now());

        let actions = session.handle_message(open(2, "relp_version=0\ncommands=syslog"));

        assert!(matches!(actions.as_slice(), [SessionAction::Destroy { .. }]));
    }

    #[test]
    fn frames_after_close_destroy() {
        let mut session = ready_session(Instant::now());
        session.handle_message(Message::new(2, Command::Close, ""));

        let actions = session.handle_message(Message::new(3, Command::Syslog, "late"));

        assert!(matches!(actions.as_slice(), [SessionAction::Destroy { .. }]));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn proxy_mode_requires_preamble() {
        let t0 = Instant::now();
        let config = SessionConfig { proxy_protocol: true, ..Default::default() };
        let mut session = Session::new(t0, config.clone());
        assert_eq!(session.state(), SessionState::AwaitingPreamble);
        assert!(!session.preamble_complete());

        session.accept_preamble(header()).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingOpen);
        assert_eq!(session.proxy().map(ProxyHeader::client_address).as_deref(), Some("10.7.254.51:45219"));

        let result = session.accept_preamble(header());
        assert!(matches!(result, Err(SessionError::InvalidState { .. })));

        let mut session = Session::new(t0, config);
        let actions = session.reject_preamble(&PreambleError::MissingTerminator);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(actions.as_slice(), [SessionAction::Destroy { .. }]));
    }

    #[test]
    fn preamble_not_accepted_without_proxy_mode() {
        let mut session = Session::new(Instant::now(), SessionConfig::default());
        let result = session.accept_preamble(header());
        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
    }

    #[test]
    fn handshake_timeout() {
        let t0 = Instant::now();
        let config =
            SessionConfig { handshake_timeout: Some(Duration::from_secs(30)), ..Default::default() };
        let mut session = Session::new(t0, config);

        assert!(session.check_timeout(t0).is_none());
        assert!(session.tick(t0 + Duration::from_secs(29)).is_empty());

        let t1 = t0 + Duration::from_secs(31);
        assert!(session.check_timeout(t1).is_some());

        let actions = session.tick(t1);
        assert!(matches!(actions.as_slice(), [SessionAction::Destroy { .. }]));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn ready_session_never_times_out() {
        let t0 = Instant::now();
        let session = ready_session(t0);
        assert!(session.check_timeout(t0 + Duration::from_secs(3600)).is_none());
    }

    #[test]
    fn paused_time_does_not_count_toward_timeout() {
        let t0 = Instant::now();
        let config = SessionConfig { handshake_timeout: Some(Duration::from_secs(10)), ..Default::default() };
        let mut session = Session::new(t0 + Duration::from_secs(5), config);

        // Paused before the session existed; only the 20s after accept are discounted
        session.discount_pause(t0, t0 + Duration::from_secs(25));
        assert!(session.check_timeout(t0 + Duration::from_secs(34)).is_none());
        assert!(session.check_timeout(t0 + Duration::from_secs(36)).is_some());
    }

    #[test]
    fn disabled_timeout() {
        let t0 = Instant::now();
        let config = SessionConfig { handshake_timeout: None, ..Default::default() };
        let mut session = Session::new(t0, config);

        assert!(session.tick(t0 + Duration::from_secs(3600)).is_empty());
        assert_eq!(session.state(), SessionState::AwaitingOpen);
    }
}
