//! Property-based tests for the staged decoder.
//!
//! The decoder must produce the same packets no matter how the byte stream
//! is cut into reads.

use bytes::Bytes;
use proptest::prelude::*;
use relay_proto::{Decoder, MessageType, Packet, Stage};

fn arbitrary_message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::Login),
        Just(MessageType::Logout),
        Just(MessageType::GeneratedId),
        Just(MessageType::Data),
    ]
}

fn arbitrary_packet() -> impl Strategy<Value = Packet> {
    (
        any::<i32>(),
        arbitrary_message_type(),
        any::<i32>(),
        any::<i32>(),
        prop::collection::vec(any::<u8>(), 0..256),
    )
        .prop_map(|(magic, message_type, source, destination, payload)| {
            Packet::new(magic, message_type, source, destination, Bytes::from(payload))
        })
}

/// Packets whose payloads cannot be cut short by the Login/Logout shortcut.
///
/// A Login or Logout header that arrives at the very end of a read closes
/// immediately, so only Data and GeneratedId are safe to split anywhere.
fn arbitrary_splittable_packet() -> impl Strategy<Value = Packet> {
    arbitrary_packet().prop_filter("payload-less kinds with payload may close early", |p| {
        !p.message_type().is_payload_less() || p.message().is_empty()
    })
}

fn encode(packet: &Packet) -> Vec<u8> {
    packet.to_bytes().expect("encode should succeed").to_vec()
}

#[test]
fn prop_split_anywhere_yields_same_packet() {
    proptest!(|(packet in arbitrary_splittable_packet(), split in any::<prop::sample::Index>())| {
        let bytes = encode(&packet);
        let split = split.index(bytes.len() + 1);
        let mut decoder = Decoder::new();

        let mut packets = decoder.feed(&bytes[..split]).packets;
        packets.extend(decoder.feed(&bytes[split..]).packets);

        // PROPERTY: Two blocks decode to exactly the packet one block would
        prop_assert_eq!(packets, vec![packet]);
        prop_assert_eq!(decoder.buffered(), 0);
        prop_assert_eq!(decoder.stage(), Stage::Init);
    });
}

#[test]
fn prop_concatenated_packets_decode_in_order() {
    proptest!(|(first in arbitrary_packet(), second in arbitrary_packet())| {
        let mut block = encode(&first);
        block.extend(encode(&second));

        let decoded = Decoder::new().feed(&block);

        // PROPERTY: One block with two packets yields both, in order
        prop_assert_eq!(decoded.packets, vec![first, second]);
        prop_assert!(decoded.rejected.is_empty());
    });
}

#[test]
fn prop_byte_at_a_time_matches_whole_stream() {
    proptest!(|(packets in prop::collection::vec(arbitrary_splittable_packet(), 1..5))| {
        let stream: Vec<u8> = packets.iter().flat_map(encode).collect();
        let mut decoder = Decoder::new();
        let mut decoded = Vec::new();

        for byte in &stream {
            decoded.extend(decoder.feed(std::slice::from_ref(byte)).packets);
        }

        // PROPERTY: Maximal fragmentation loses nothing
        prop_assert_eq!(decoded, packets);
    });
}

#[test]
fn prop_garbage_never_panics() {
    proptest!(|(blocks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8))| {
        let mut decoder = Decoder::new();

        for block in &blocks {
            // PROPERTY: Arbitrary input only ever yields packets or errors
            let decoded = decoder.feed(block);
            for packet in &decoded.packets {
                prop_assert!(packet.is_complete());
            }
        }
    });
}
