//! Fuzz target for Packet::decode
//!
//! Feeds arbitrary byte sequences to the one-shot decoder to find:
//! - Parser crashes or panics
//! - Integer overflows in length calculations
//! - Buffer over-reads
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relay_proto::Packet;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = Packet::decode(data) {
        // Anything that decodes must encode back to the bytes it came from
        let encoded = packet.to_bytes().expect("decoded packet must re-encode");
        assert_eq!(&encoded[..], &data[..encoded.len()]);
    }
});
