//! Decode arbitrary bytes as a RELP stream.
//!
//! Every decoded frame must re-encode to bytes that decode back to it.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relp_proto::{FrameCodec, RelpCodec};

fuzz_target!(|data: &[u8]| {
    let mut codec = RelpCodec::default();
    codec.consume(data);

    while let Ok(Some(message)) = codec.next_message() {
        assert_eq!(message.body_length, message.body.len());

        let encoded = codec.serialize(&message);
        let mut check = RelpCodec::default();
        check.consume(&encoded);
        let decoded = check.next_message().expect("re-encoded frame decodes").expect("complete");
        assert_eq!(decoded, message);
    }
});
