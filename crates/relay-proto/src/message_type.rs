//! Message kinds and their two-byte wire codes.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// The closed set of packet kinds.
///
/// Each kind is bound to a fixed ASCII code. Conversion from a wire code
/// never falls back to a default: an unknown code is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client asks for an auth token; the server answers with one.
    Login,
    /// Client gives up its token; the server confirms.
    Logout,
    /// Server tells a freshly accepted client its id.
    GeneratedId,
    /// Client-to-client text, forwarded by destination id.
    Data,
}

impl MessageType {
    /// Every message type, in wire-code declaration order.
    pub const ALL: [Self; 4] = [Self::Login, Self::Logout, Self::GeneratedId, Self::Data];

    /// Wire code for this message type.
    pub const fn code(self) -> [u8; 2] {
        match self {
            Self::Login => *b"LI",
            Self::Logout => *b"LO",
            Self::GeneratedId => *b"ID",
            Self::Data => *b"DT",
        }
    }

    /// Resolve a wire code.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownMessageType` if `code` is not one of the four
    ///   assigned codes.
    pub fn from_code(code: [u8; 2]) -> Result<Self> {
        match &code {
            b"LI" => Ok(Self::Login),
            b"LO" => Ok(Self::Logout),
            b"ID" => Ok(Self::GeneratedId),
            b"DT" => Ok(Self::Data),
            _ => Err(ProtocolError::UnknownMessageType { code }),
        }
    }

    /// Kinds that complete without waiting for payload bytes.
    ///
    /// The decoder closes a Login or Logout packet as soon as its header is
    /// read and the buffer is empty.
    pub const fn is_payload_less(self) -> bool {
        matches!(self, Self::Login | Self::Logout)
    }
}

impl TryFrom<[u8; 2]> for MessageType {
    type Error = ProtocolError;

    fn try_from(code: [u8; 2]) -> Result<Self> {
        Self::from_code(code)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::GeneratedId => "GENERATED_ID",
            Self::Data => "DATA",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_resolve_back_to_their_type() {
        for ty in MessageType::ALL {
            assert_eq!(MessageType::from_code(ty.code()), Ok(ty));
        }
    }

    #[test]
    fn codes_are_distinct() {
        let codes: std::collections::HashSet<_> =
            MessageType::ALL.iter().map(|ty| ty.code()).collect();
        assert_eq!(codes.len(), MessageType::ALL.len());
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(
            MessageType::from_code(*b"li"),
            Err(ProtocolError::UnknownMessageType { code: *b"li" })
        );
        assert!(MessageType::try_from(*b"  ").is_err());
    }

    #[test]
    fn only_login_and_logout_are_payload_less() {
        assert!(MessageType::Login.is_payload_less());
        assert!(MessageType::Logout.is_payload_less());
        assert!(!MessageType::Data.is_payload_less());
        assert!(!MessageType::GeneratedId.is_payload_less());
    }
}
