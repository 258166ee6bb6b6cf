//! Relay driver.
//!
//! Turns raw byte blocks into routing decisions. The driver owns one
//! [`Decoder`] per connection and consults the [`ClientRegistry`] for
//! identities and tokens, but performs no I/O itself: every outcome is a
//! [`RelayAction`] for the runtime to execute.
//!
//! # Dispatch
//!
//! - `LOGIN`: issue a token and reply with it in the magic-bytes field
//! - `LOGOUT`: verify the token, revoke it and confirm
//! - `DATA`: verify the token, then forward unchanged to the destination, or
//!   reply with an error if the destination is not connected
//! - `GENERATED_ID`: server-to-client only, ignored when received
//!
//! Packets failing authentication are dropped without a reply.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use relay_proto::{ClientId, Decoder, MessageType, Packet, ProtocolError};

use crate::{env::Environment, registry::ClientRegistry};

/// Events that the relay driver processes.
///
/// Produced by the connection readers and consumed in arrival order.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A block of bytes was read from a connection
    BytesReceived {
        /// Connection the bytes arrived on
        client_id: ClientId,
        /// Everything one read returned
        block: Bytes,
    },

    /// A connection was closed (by peer or error)
    ClientDisconnected {
        /// Connection that was closed
        client_id: ClientId,
    },
}

/// Actions that the relay driver produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Write a packet to a client's transport
    SendToClient {
        /// Target client
        client_id: ClientId,
        /// Packet to write
        packet: Packet,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for relay actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based relay logic.
///
/// Not `Sync`-shared: a single processor task owns the driver, so decoder
/// state never needs a lock. The registry is shared.
pub struct RelayDriver<H, E> {
    registry: Arc<ClientRegistry<H, E>>,
    decoders: HashMap<ClientId, Decoder>,
}

impl<H, E: Environment> RelayDriver<H, E> {
    /// Create a driver routing through `registry`.
    pub fn new(registry: Arc<ClientRegistry<H, E>>) -> Self {
        Self { registry, decoders: HashMap::new() }
    }

    /// Process one event and return the resulting actions, in order.
    pub fn process_event(&mut self, event: RelayEvent) -> Vec<RelayAction> {
        match event {
            RelayEvent::BytesReceived { client_id, block } => {
                self.handle_bytes_received(client_id, &block)
            },
            RelayEvent::ClientDisconnected { client_id } => {
                self.handle_client_disconnected(client_id)
            },
        }
    }

    /// Number of connections with decoder state.
    pub fn decoder_count(&self) -> usize {
        self.decoders.len()
    }

    fn handle_bytes_received(&mut self, client_id: ClientId, block: &[u8]) -> Vec<RelayAction> {
        let decoded = self.decoders.entry(client_id).or_default().feed(block);

        let mut actions: Vec<RelayAction> = decoded
            .rejected
            .iter()
            .map(|err| {
                let message = match err {
                    ProtocolError::ShortPayload { .. } => format!(
                        "discarding input from client {client_id}: {err}; the read ended on a \
                         LOGIN/LOGOUT header, so the bytes that follow may be misframed"
                    ),
                    _ => format!("discarding input from client {client_id}: {err}"),
                };
                RelayAction::Log { level: LogLevel::Warn, message }
            })
            .collect();

        for packet in decoded.packets {
            actions.extend(self.handle_packet(client_id, packet));
        }

        actions
    }

    fn handle_packet(&self, client_id: ClientId, packet: Packet) -> Vec<RelayAction> {
        if packet.source_id() != client_id {
            return vec![RelayAction::Log {
                level: LogLevel::Warn,
                message: format!(
                    "client {client_id} sent {} claiming source {}, dropped",
                    packet.message_type(),
                    packet.source_id()
                ),
            }];
        }

        match packet.message_type() {
            MessageType::Login => self.handle_login(&packet),
            MessageType::Logout => self.handle_logout(&packet),
            MessageType::Data => self.handle_data(packet),
            MessageType::GeneratedId => vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("ignoring {} from client {client_id}", packet.message_type()),
            }],
        }
    }

    fn handle_login(&self, packet: &Packet) -> Vec<RelayAction> {
        let client_id = packet.source_id();
        match self.registry.issue_auth_token(client_id) {
            Some(token) => vec![
                RelayAction::SendToClient {
                    client_id,
                    packet: Packet::login_reply(packet, token),
                },
                RelayAction::Log {
                    level: LogLevel::Info,
                    message: format!("client {client_id} logged in"),
                },
            ],
            None => vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("login from unregistered client {client_id} dropped"),
            }],
        }
    }

    fn handle_logout(&self, packet: &Packet) -> Vec<RelayAction> {
        let client_id = packet.source_id();
        if !self.registry.verify(client_id, packet.magic_bytes()) {
            return vec![authentication_failed(packet)];
        }

        self.registry.revoke(client_id);
        vec![
            RelayAction::SendToClient { client_id, packet: Packet::logout_reply(packet) },
            RelayAction::Log {
                level: LogLevel::Info,
                message: format!("client {client_id} logged out"),
            },
        ]
    }

    fn handle_data(&self, packet: Packet) -> Vec<RelayAction> {
        let source = packet.source_id();
        if !self.registry.verify(source, packet.magic_bytes()) {
            return vec![authentication_failed(&packet)];
        }

        let destination = packet.destination_id();
        if self.registry.is_registered(destination) {
            vec![RelayAction::SendToClient { client_id: destination, packet }]
        } else {
            vec![
                RelayAction::SendToClient {
                    client_id: source,
                    packet: Packet::invalid_destination(&packet),
                },
                RelayAction::Log {
                    level: LogLevel::Debug,
                    message: format!("client {source} addressed unknown client {destination}"),
                },
            ]
        }
    }

    fn handle_client_disconnected(&mut self, client_id: ClientId) -> Vec<RelayAction> {
        let partial = self.decoders.remove(&client_id).map_or(0, |decoder| decoder.buffered());

        let message = if partial == 0 {
            format!("client {client_id} disconnected")
        } else {
            format!("client {client_id} disconnected with {partial} undecoded bytes")
        };

        vec![RelayAction::Log { level: LogLevel::Info, message }]
    }
}

fn authentication_failed(packet: &Packet) -> RelayAction {
    RelayAction::Log {
        level: LogLevel::Debug,
        message: format!(
            "{} from client {} failed authentication, dropped",
            packet.message_type(),
            packet.source_id()
        ),
    }
}

impl<H, E> std::fmt::Debug for RelayDriver<H, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDriver").field("decoder_count", &self.decoders.len()).finish()
    }
}
