//! Packet value and whole-frame codec.
//!
//! A `Packet` is one protocol message: an 18-byte [`PacketHeader`] followed
//! by `message_length` payload bytes. Encoding writes the fields in order with
//! no padding and no checksum; decoding is the exact inverse.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    MessageType, PacketHeader,
    errors::{ProtocolError, Result},
};

/// Client identity as carried in the source and destination fields.
pub type ClientId = i32;

/// Id the server uses as the source of every packet it originates.
pub const SERVER_ID: ClientId = 0;

/// Magic bytes on packets sent before a client holds a token.
pub const NO_MAGIC_BYTES: i32 = 0;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Text returned to a sender whose destination id is not connected.
pub const INVALID_DESTINATION_MESSAGE: &str =
    "Please specify correct Id. User with this ID not present";

/// One protocol message.
///
/// # Invariants
///
/// - Length Consistency: for a packet built with [`Packet::new`] or returned
///   by [`Packet::decode`], `message().len() == message_length()`. The staged
///   decoder refuses to emit packets that break this (see
///   [`ProtocolError::ShortPayload`]).
/// - Immutability: fields are private and there are no setters. A packet is
///   forwarded exactly as it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    magic_bytes: i32,
    message_type: MessageType,
    source_id: ClientId,
    destination_id: ClientId,
    message_length: i32,
    message: Bytes,
}

impl Packet {
    /// Build a packet, deriving `message_length` from the payload.
    ///
    /// A payload longer than `i32::MAX` saturates the length field; such a
    /// packet is far over [`MAX_PAYLOAD_SIZE`] and is rejected by
    /// [`Packet::encode`].
    pub fn new(
        magic_bytes: i32,
        message_type: MessageType,
        source_id: ClientId,
        destination_id: ClientId,
        message: impl Into<Bytes>,
    ) -> Self {
        let message = message.into();
        let message_length = i32::try_from(message.len()).unwrap_or(i32::MAX);

        Self { magic_bytes, message_type, source_id, destination_id, message_length, message }
    }

    /// Build a packet with an explicit declared length.
    ///
    /// Used by the staged decoder, which must check the declared length
    /// against the bytes it actually collected.
    pub(crate) fn from_parts(
        header: &PacketHeader,
        message_type: MessageType,
        message: Bytes,
    ) -> Self {
        Self {
            magic_bytes: header.magic_bytes(),
            message_type,
            source_id: header.source_id(),
            destination_id: header.destination_id(),
            message_length: header.message_length(),
            message,
        }
    }

    /// Welcome packet telling a new client its id.
    pub fn generated_id(client_id: ClientId) -> Self {
        Self::new(NO_MAGIC_BYTES, MessageType::GeneratedId, SERVER_ID, client_id, Bytes::new())
    }

    /// Reply to a login request carrying the freshly issued token.
    ///
    /// The request's payload is echoed back unchanged.
    pub fn login_reply(request: &Self, token: i32) -> Self {
        Self::new(
            token,
            MessageType::Login,
            SERVER_ID,
            request.source_id,
            request.message.clone(),
        )
    }

    /// Confirmation of a successful logout, echoing the request's payload.
    pub fn logout_reply(request: &Self) -> Self {
        Self::new(
            request.magic_bytes,
            MessageType::Logout,
            SERVER_ID,
            request.source_id,
            request.message.clone(),
        )
    }

    /// Error returned to the sender of a Data packet whose destination is not
    /// connected.
    pub fn invalid_destination(request: &Self) -> Self {
        Self::new(
            request.magic_bytes,
            MessageType::Data,
            SERVER_ID,
            request.source_id,
            Bytes::from_static(INVALID_DESTINATION_MESSAGE.as_bytes()),
        )
    }

    /// Magic bytes (auth token for logged-in clients).
    pub fn magic_bytes(&self) -> i32 {
        self.magic_bytes
    }

    /// Message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Sending client id.
    pub fn source_id(&self) -> ClientId {
        self.source_id
    }

    /// Receiving client id.
    pub fn destination_id(&self) -> ClientId {
        self.destination_id
    }

    /// Declared payload length.
    pub fn message_length(&self) -> i32 {
        self.message_length
    }

    /// Raw payload bytes.
    pub fn message(&self) -> &Bytes {
        &self.message
    }

    /// Payload as text. Invalid UTF-8 is replaced, not rejected.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }

    /// True if the payload length equals the declared length.
    pub fn is_complete(&self) -> bool {
        usize::try_from(self.message_length).is_ok_and(|len| len == self.message.len())
    }

    /// Header for this packet.
    pub fn header(&self) -> PacketHeader {
        PacketHeader::new(
            self.magic_bytes,
            self.message_type,
            self.source_id,
            self.destination_id,
            self.message_length,
        )
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        PacketHeader::SIZE + self.message.len()
    }

    /// Encode into `dst`.
    ///
    /// Writes `[header (18 bytes)] + [payload]`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds
    ///   [`MAX_PAYLOAD_SIZE`]. Nothing is written in that case.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.message.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.message.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        debug_assert!(self.is_complete(), "encoding packet with inconsistent length");

        dst.put_slice(&self.header().to_bytes());
        dst.put_slice(&self.message);

        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one packet from the front of `bytes`.
    ///
    /// Trailing bytes after the declared payload are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the header is incomplete
    /// - `ProtocolError::UnknownMessageType` for an unassigned type code
    /// - `ProtocolError::NegativeLength` / `PayloadTooLarge` for a length
    ///   outside `0..=MAX_PAYLOAD_SIZE`
    /// - `ProtocolError::FrameTruncated` if fewer payload bytes follow than
    ///   the header declares
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::from_bytes(bytes)?;
        let message_type = header.message_type()?;
        let payload_len = checked_payload_len(header.message_length())?;

        let body = &bytes[PacketHeader::SIZE..];
        let payload = body.get(..payload_len).ok_or(ProtocolError::FrameTruncated {
            expected: payload_len,
            actual: body.len(),
        })?;

        Ok(Self::from_parts(&header, message_type, Bytes::copy_from_slice(payload)))
    }
}

/// Validate a declared payload length and convert it to `usize`.
pub(crate) fn checked_payload_len(declared: i32) -> Result<usize> {
    let len = usize::try_from(declared).map_err(|_| ProtocolError::NegativeLength(declared))?;

    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge { size: len, max: MAX_PAYLOAD_SIZE });
    }

    Ok(len)
}
