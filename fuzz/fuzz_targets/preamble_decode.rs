//! Decode arbitrary bytes as a PROXY v1 preamble.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relp_proto::{PreambleCodec, ProxyV1};

fuzz_target!(|data: &[u8]| {
    if let Ok((header, rest)) = ProxyV1.decode(data) {
        assert!(rest.len() + 2 <= data.len());
        let _ = header.client_addr();
    }
});
