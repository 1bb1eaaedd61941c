//! Decoding must not depend on how the stream is split into reads.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relp_proto::{FrameCodec, Message, ParseError, RelpCodec};

fn drain(codec: &mut RelpCodec, out: &mut Vec<Message>) -> Result<(), ParseError> {
    while let Some(message) = codec.next_message()? {
        out.push(message);
    }
    Ok(())
}

fuzz_target!(|input: (u8, &[u8])| {
    let (chunk, data) = input;
    let chunk = usize::from(chunk.max(1));

    let mut whole = RelpCodec::default();
    let mut expected = Vec::new();
    whole.consume(data);
    let whole_result = drain(&mut whole, &mut expected);

    let mut split = RelpCodec::default();
    let mut actual = Vec::new();
    let mut split_result = Ok(());
    for piece in data.chunks(chunk) {
        split.consume(piece);
        split_result = drain(&mut split, &mut actual);
        if split_result.is_err() {
            break;
        }
    }

    assert_eq!(actual, expected);
    assert_eq!(split_result.is_err(), whole_result.is_err());
});
