//! Fuzz target for the staged stream decoder
//!
//! # Strategy
//!
//! - Arbitrary byte stream cut into arbitrary blocks
//! - Same stream fed as one block
//!
//! # Invariants
//!
//! - Feeding never panics, whatever the input
//! - Every emitted packet is complete (payload length matches header)
//! - A stream of well-formed DATA packets decodes identically however it is
//!   cut

#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use relay_proto::{Decoder, MessageType, Packet};

#[derive(Debug, Arbitrary)]
struct Input {
    garbage: Vec<u8>,
    cuts: Vec<u8>,
    messages: Vec<(i32, i32, i32, Vec<u8>)>,
}

fn feed_in_blocks(stream: &[u8], cuts: &[u8]) -> Vec<Packet> {
    let mut decoder = Decoder::new();
    let mut packets = Vec::new();
    let mut rest = stream;

    for &cut in cuts {
        if rest.is_empty() {
            break;
        }
        let (block, tail) = rest.split_at((cut as usize).min(rest.len()));
        let decoded = decoder.feed(block);
        for packet in &decoded.packets {
            assert!(packet.is_complete());
        }
        packets.extend(decoded.packets);
        rest = tail;
    }

    packets.extend(decoder.feed(rest).packets);
    packets
}

fuzz_target!(|input: Input| {
    // Garbage: only structured results
    let _ = feed_in_blocks(&input.garbage, &input.cuts);

    // Well-formed DATA stream: split placement must not matter
    let packets: Vec<Packet> = input
        .messages
        .into_iter()
        .take(16)
        .map(|(magic, source, destination, payload)| {
            Packet::new(magic, MessageType::Data, source, destination, Bytes::from(payload))
        })
        .collect();

    let stream: Vec<u8> = packets
        .iter()
        .flat_map(|p| p.to_bytes().expect("small packets encode").to_vec())
        .collect();

    let whole = Decoder::new().feed(&stream).packets;
    assert_eq!(whole, packets);

    let split = feed_in_blocks(&stream, &input.cuts);
    assert_eq!(split, packets);
});
