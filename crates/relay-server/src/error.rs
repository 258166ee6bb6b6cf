//! Server error types.

use std::fmt;

use relay_proto::{ClientId, ProtocolError};

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, zero-sized queue, etc.).
    ///
    /// Fatal: the server refuses to start. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, socket I/O error, etc.).
    ///
    /// Fatal at startup. After startup it only ever ends one connection.
    Transport(String),

    /// Protocol error raised while encoding an outbound packet.
    Protocol(ProtocolError),

    /// Internal error (a runtime task died or a channel closed early).
    ///
    /// Indicates a bug. Report as issue.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Errors returned by [`ClientRegistry`](crate::ClientRegistry) mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The id already has a transport bound to it.
    AlreadyRegistered(ClientId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(id) => write!(f, "client {id} is already registered"),
        }
    }
}

impl std::error::Error for RegistryError {}
