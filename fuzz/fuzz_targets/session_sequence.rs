//! Drive a session with arbitrary command sequences.
//!
//! Once a session closes it must never deliver or respond again.

#![no_main]

use std::time::{Duration, Instant};

use libfuzzer_sys::fuzz_target;
use relp_core::{Session, SessionAction, SessionConfig, SessionState};
use relp_proto::{Command, Message};

const OFFERS: [&str; 4] = [
    "relp_version=0\ncommands=syslog",
    "relp_version=1\ncommands=syslog",
    "relp_version=0",
    "relp_version=0\ncommands=syslog,bogus",
];

fuzz_target!(|ops: Vec<u8>| {
    let start = Instant::now();
    let mut session = Session::new(start, SessionConfig::default());

    for (i, op) in ops.into_iter().enumerate() {
        let was_closed = session.state() == SessionState::Closed;
        let txnr = i as u32 + 1;

        let actions = match op % 6 {
            0 => session.handle_message(Message::new(txnr, Command::Open, OFFERS[usize::from(op / 6) % 4])),
            1 | 2 => session.handle_message(Message::new(txnr, Command::Syslog, "record")),
            3 => session.handle_message(Message::new(txnr, Command::Close, "")),
            4 => session.handle_message(Message::new(txnr, Command::Other("starttls".into()), "")),
            _ => session.tick(start + Duration::from_secs(u64::from(op))),
        };

        if was_closed {
            assert!(actions.iter().all(|a| matches!(a, SessionAction::Destroy { .. })));
        }
        if actions.iter().any(|a| matches!(a, SessionAction::Destroy { .. })) {
            assert_eq!(session.state(), SessionState::Closed);
        }
    }
});
