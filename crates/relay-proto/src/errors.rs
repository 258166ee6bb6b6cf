//! Protocol error types.
//!
//! Every failure the codec or the staged decoder can report. None of these
//! carry I/O state: the protocol crate never touches a socket.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the fixed packet header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Header declares more payload bytes than the buffer holds.
    #[error("frame truncated: header declares {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload length declared in the header
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Two-byte type code does not name any [`crate::MessageType`].
    #[error("unknown message type code \"{}\"", .code.escape_ascii())]
    UnknownMessageType {
        /// The unrecognized code as it appeared on the wire
        code: [u8; 2],
    },

    /// Declared payload length is negative.
    #[error("negative message length: {0}")]
    NegativeLength(i32),

    /// Payload exceeds [`crate::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size in bytes
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// A packet completed with fewer payload bytes than it declared.
    ///
    /// Only reachable through the Login/Logout shortcut, where a packet is
    /// closed as soon as the buffer runs dry. Payload bytes arriving after
    /// the rejection are misread as the next header.
    #[error("short payload: declared {expected} bytes, received {actual}")]
    ShortPayload {
        /// Declared payload length
        expected: usize,
        /// Payload bytes received before the packet was closed
        actual: usize,
    },
}

impl ProtocolError {
    /// Returns true if the error discards the rest of the buffered bytes.
    ///
    /// A short payload leaves nothing buffered to discard. Everything else
    /// leaves the byte stream at an unknown offset, so the decoder cannot
    /// trust anything buffered after it.
    pub fn is_fatal_to_buffer(&self) -> bool {
        !matches!(self, Self::ShortPayload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_display_escapes_code() {
        let err = ProtocolError::UnknownMessageType { code: *b"X\n" };
        assert_eq!(err.to_string(), "unknown message type code \"X\\n\"");
    }

    #[test]
    fn short_payload_is_not_fatal() {
        assert!(!ProtocolError::ShortPayload { expected: 4, actual: 0 }.is_fatal_to_buffer());
        assert!(ProtocolError::NegativeLength(-1).is_fatal_to_buffer());
        assert!(ProtocolError::UnknownMessageType { code: *b"ZZ" }.is_fatal_to_buffer());
    }
}
