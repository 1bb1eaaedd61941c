//! Property tests for handshake negotiation and session dispatch.

use std::time::Instant;

use proptest::prelude::*;
use relp_core::{Offers, Session, SessionAction, SessionConfig, SessionState};
use relp_proto::{Command, Message};

fn supported_command() -> impl Strategy<Value = String> {
    (prop_oneof![Just("open"), Just("close"), Just("syslog")], any::<bool>(), " {0,2}")
        .prop_map(|(name, upper, pad)| {
            let name = if upper { name.to_uppercase() } else { name.to_string() };
            format!("{pad}{name}{pad}")
        })
}

proptest! {
    #[test]
    fn supported_command_lists_negotiate(
        commands in proptest::collection::vec(supported_command(), 1..5),
    ) {
        let list = commands.join(",");
        let offers = Offers::parse(&format!("relp_version=0\ncommands={list}"));

        let negotiated = offers.negotiate();
        prop_assert!(negotiated.is_ok());
        prop_assert_eq!(negotiated.map(|n| n.commands), Ok(list));
    }

    #[test]
    fn any_other_version_is_refused(version in "[0-9a-z]{1,4}") {
        prop_assume!(version != "0");
        let offers = Offers::parse(&format!("relp_version={version}\ncommands=syslog"));
        prop_assert!(offers.negotiate().is_err());
    }

    #[test]
    fn syslog_is_delivered_only_after_open(
        bodies in proptest::collection::vec("[ -~]{0,32}", 1..10),
    ) {
        let mut session = Session::new(Instant::now(), SessionConfig::default());
        session.handle_message(Message::new(1, Command::Open, "relp_version=0\ncommands=syslog"));
        prop_assert_eq!(session.state(), SessionState::Ready);

        for (i, body) in bodies.iter().enumerate() {
            let txnr = u32::try_from(i).unwrap_or(u32::MAX) + 2;
            let actions = session.handle_message(Message::new(txnr, Command::Syslog, body.as_str()));
            prop_assert_eq!(actions.len(), 1);
            match &actions[0] {
                SessionAction::Deliver(message) => {
                    prop_assert_eq!(message.transaction_id, txnr);
                    prop_assert_eq!(&message.body, body);
                },
                other => prop_assert!(false, "unexpected action {:?}", other),
            }
        }
    }
}
