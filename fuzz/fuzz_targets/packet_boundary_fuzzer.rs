//! Fuzz target for packet header boundary conditions
//!
//! # Strategy
//!
//! - Message type: every valid code plus random pairs
//! - Message length: zero, small, at-max, just-over-max, negative, i32::MAX
//! - Ids: boundary values (0, 1, -1, MAX)
//!
//! # Invariants
//!
//! - Negative lengths MUST return `ProtocolError::NegativeLength`
//! - Lengths over 16 MiB MUST return `ProtocolError::PayloadTooLarge`
//! - Unknown type codes MUST return `ProtocolError::UnknownMessageType`
//! - The decoder recovers: a valid packet after any bad header still decodes

#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use relay_proto::{Decoder, MAX_PAYLOAD_SIZE, MessageType, Packet, PacketHeader, ProtocolError};

#[derive(Debug, Clone, Arbitrary)]
enum TypeCode {
    Valid(u8),
    Random([u8; 2]),
}

#[derive(Debug, Clone, Arbitrary)]
enum Length {
    Zero,
    Small(u8),
    AtMax,
    JustOverMax,
    Negative(u8),
    Max,
}

#[derive(Debug, Clone, Arbitrary)]
enum Id {
    Zero,
    One,
    MinusOne,
    Max,
    Random(i32),
}

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryHeader {
    magic: i32,
    code: TypeCode,
    source: Id,
    destination: Id,
    length: Length,
}

fn id(value: &Id) -> i32 {
    match value {
        Id::Zero => 0,
        Id::One => 1,
        Id::MinusOne => -1,
        Id::Max => i32::MAX,
        Id::Random(v) => *v,
    }
}

fn length(value: &Length) -> i32 {
    let max = MAX_PAYLOAD_SIZE as i32;
    match value {
        Length::Zero => 0,
        Length::Small(n) => i32::from(*n),
        Length::AtMax => max,
        Length::JustOverMax => max + 1,
        Length::Negative(n) => -1 - i32::from(*n),
        Length::Max => i32::MAX,
    }
}

fuzz_target!(|header: BoundaryHeader| {
    let code = match header.code {
        TypeCode::Valid(i) => MessageType::ALL[i as usize % MessageType::ALL.len()].code(),
        TypeCode::Random(code) => code,
    };
    let declared = length(&header.length);

    let mut bytes = Vec::with_capacity(PacketHeader::SIZE);
    bytes.extend_from_slice(&header.magic.to_be_bytes());
    bytes.extend_from_slice(&code);
    bytes.extend_from_slice(&id(&header.source).to_be_bytes());
    bytes.extend_from_slice(&id(&header.destination).to_be_bytes());
    bytes.extend_from_slice(&declared.to_be_bytes());

    let mut decoder = Decoder::new();
    let decoded = decoder.feed(&bytes);

    if MessageType::from_code(code).is_err() {
        assert!(matches!(decoded.rejected[..], [ProtocolError::UnknownMessageType { .. }]));
    } else if declared < 0 {
        assert!(matches!(decoded.rejected[..], [ProtocolError::NegativeLength(_)]));
    } else if declared as usize > MAX_PAYLOAD_SIZE {
        assert!(matches!(decoded.rejected[..], [ProtocolError::PayloadTooLarge { .. }]));
    }

    if !decoded.rejected.is_empty() {
        // Hard errors leave the decoder idle and ready for the next packet
        let sentinel = Packet::new(1, MessageType::Data, 1, 2, Bytes::from_static(b"sentinel"));
        let after = decoder.feed(&sentinel.to_bytes().expect("sentinel encodes"));
        assert_eq!(after.packets, vec![sentinel]);
    }
});
