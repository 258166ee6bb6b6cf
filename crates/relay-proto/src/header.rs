//! Fixed 18-byte packet header.
//!
//! The header is a plain byte layout read with `zerocopy`, so parsing it is a
//! bounds check plus a copy. All integers are big-endian signed 32-bit.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    MessageType,
    errors::{ProtocolError, Result},
};

/// Packet header in network byte order.
///
/// | Field          | Offset | Size |
/// |----------------|--------|------|
/// | magic bytes    | 0      | 4    |
/// | message type   | 4      | 2    |
/// | source id      | 6      | 4    |
/// | destination id | 10     | 4    |
/// | message length | 14     | 4    |
///
/// Fields are byte arrays so the struct has alignment 1 and every 18-byte
/// pattern is a valid value. The type code is validated on access, not on
/// cast.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    magic_bytes: [u8; 4],
    message_type: [u8; 2],
    source_id: [u8; 4],
    destination_id: [u8; 4],
    message_length: [u8; 4],
}

impl PacketHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 18;

    /// Build a header from decoded field values.
    pub fn new(
        magic_bytes: i32,
        message_type: MessageType,
        source_id: i32,
        destination_id: i32,
        message_length: i32,
    ) -> Self {
        Self {
            magic_bytes: magic_bytes.to_be_bytes(),
            message_type: message_type.code(),
            source_id: source_id.to_be_bytes(),
            destination_id: destination_id.to_be_bytes(),
            message_length: message_length.to_be_bytes(),
        }
    }

    /// Read a header from the front of `bytes`.
    ///
    /// Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than [`Self::SIZE`] bytes are
    ///   available.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from_prefix(bytes)
            .map(|(header, _rest)| header)
            .map_err(|_| ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() })
    }

    /// Raw header bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Magic bytes (the auth token once a client is logged in).
    pub fn magic_bytes(&self) -> i32 {
        i32::from_be_bytes(self.magic_bytes)
    }

    /// Message type.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownMessageType` if the code is unassigned.
    pub fn message_type(&self) -> Result<MessageType> {
        MessageType::from_code(self.message_type)
    }

    /// Raw two-byte type code.
    pub fn message_type_code(&self) -> [u8; 2] {
        self.message_type
    }

    /// Sending client id.
    pub fn source_id(&self) -> i32 {
        i32::from_be_bytes(self.source_id)
    }

    /// Receiving client id.
    pub fn destination_id(&self) -> i32 {
        i32::from_be_bytes(self.destination_id)
    }

    /// Declared payload length in bytes. May be negative on hostile input.
    pub fn message_length(&self) -> i32 {
        i32::from_be_bytes(self.message_length)
    }
}
