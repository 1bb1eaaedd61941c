//! Property tests for the frame codec.
//!
//! - Feeding a frame in any sequence of non-empty chunks yields the same single
//!   message as feeding it whole.
//! - Decoding an encoded message reproduces its header fields and body.

use proptest::prelude::*;
use relp_proto::{Command, FrameCodec, Message, RelpCodec};

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Open),
        Just(Command::Close),
        Just(Command::Syslog),
        Just(Command::Rsp),
        "[a-z]{1,32}".prop_map(|token| Command::from(token.as_str())),
    ]
}

fn message() -> impl Strategy<Value = Message> {
    (1u32..1_000_000_000, command(), "\\PC{0,64}(\n\\PC{0,16}){0,3}")
        .prop_map(|(txnr, command, body)| Message::new(txnr, command, body))
}

/// Split `bytes` at the given cut points (deduplicated, in range).
fn split(bytes: &[u8], mut cuts: Vec<usize>) -> Vec<&[u8]> {
    cuts.retain(|&cut| cut > 0 && cut < bytes.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(&bytes[start..cut]);
        start = cut;
    }
    chunks.push(&bytes[start..]);
    chunks
}

fn decode_all(codec: &mut RelpCodec) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some(message) = codec.next_message().expect("valid frame") {
        out.push(message);
    }
    out
}

proptest! {
    #[test]
    fn roundtrip_preserves_fields(original in message()) {
        let mut codec = RelpCodec::default();
        let wire = codec.serialize(&original);

        codec.consume(&wire);
        let decoded = decode_all(&mut codec);

        prop_assert_eq!(decoded.len(), 1);
        prop_assert_eq!(decoded[0].transaction_id, original.transaction_id);
        prop_assert_eq!(&decoded[0].command, &original.command);
        prop_assert_eq!(decoded[0].body_length, original.body.len());
        prop_assert_eq!(&decoded[0].body, &original.body);
    }

    #[test]
    fn fragmentation_is_invisible(
        original in message(),
        cuts in proptest::collection::vec(0usize..256, 0..12),
    ) {
        let encoder = RelpCodec::default();
        let wire = encoder.serialize(&original);

        let mut whole = RelpCodec::default();
        whole.consume(&wire);
        let expected = decode_all(&mut whole);

        let mut fragmented = RelpCodec::default();
        let mut actual = Vec::new();
        for chunk in split(&wire, cuts) {
            fragmented.consume(chunk);
            actual.extend(decode_all(&mut fragmented));
        }

        prop_assert_eq!(actual.len(), 1);
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn back_to_back_frames_keep_order(
        messages in proptest::collection::vec(message(), 1..8),
    ) {
        let mut codec = RelpCodec::default();
        let mut wire = Vec::new();
        for message in &messages {
            wire.extend_from_slice(&codec.serialize(message));
        }

        codec.consume(&wire);
        let decoded = decode_all(&mut codec);

        let expected: Vec<u32> = messages.iter().map(|m| m.transaction_id).collect();
        let actual: Vec<u32> = decoded.iter().map(|m| m.transaction_id).collect();
        prop_assert_eq!(actual, expected);
    }
}
