//! Staged, resumable packet decoder.
//!
//! Socket reads do not respect packet boundaries. One read can hold several
//! whole packets, a fraction of one, or the tail of a packet begun in an
//! earlier read. The decoder absorbs this by walking a fixed list of stages,
//! each consuming a known-length prefix of the buffered bytes:
//!
//! ```text
//! Init → Magic → Type → Source → Destination → Length → Payload → Done
//! ```
//!
//! A stage that lacks bytes halts the walk without consuming anything. The
//! stage and the partially built packet survive until the next [`Decoder::feed`]
//! call, so a packet split across reads is resumed exactly where it stopped.
//!
//! The stage logic is the pure function [`transition`]: given a state and the
//! buffered bytes it returns the next state, how many bytes it consumed, and
//! an optional completed packet. [`Decoder`] is the loop that drives it over
//! an accumulating buffer.

use bytes::{Buf, BytesMut};

use crate::{
    MessageType, Packet, PacketHeader,
    errors::{ProtocolError, Result},
    packet::checked_payload_len,
};

/// Decoder stage, in the fixed order they run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reset the in-progress packet. Always advances.
    #[default]
    Init,
    /// Read 4 bytes of magic.
    Magic,
    /// Read the 2-byte type code.
    Type,
    /// Read the 4-byte source id.
    Source,
    /// Read the 4-byte destination id.
    Destination,
    /// Read the 4-byte payload length.
    Length,
    /// Collect payload bytes until the declared length is reached.
    Payload,
    /// Hand the completed packet out and return to `Init`.
    Done,
}

/// Fields collected so far for the packet being decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialPacket {
    magic_bytes: i32,
    message_type: Option<MessageType>,
    source_id: i32,
    destination_id: i32,
    message_length: usize,
    payload: BytesMut,
}

impl PartialPacket {
    /// Payload bytes still missing.
    fn remaining(&self) -> usize {
        self.message_length.saturating_sub(self.payload.len())
    }

    /// Close the packet.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::ShortPayload` if fewer payload bytes were collected
    ///   than declared. The packet is dropped, and any of its payload still
    ///   in flight will be read as the start of the next header.
    fn finish(self) -> Result<Packet> {
        if self.payload.len() != self.message_length {
            return Err(ProtocolError::ShortPayload {
                expected: self.message_length,
                actual: self.payload.len(),
            });
        }

        // INVARIANT: the Type stage always runs before Done, and a failed type
        // lookup aborts the walk, so a packet reaching Done has a type.
        let Some(message_type) = self.message_type else {
            unreachable!("packet reached Done without a message type");
        };

        // INVARIANT: Length stage bounded message_length by MAX_PAYLOAD_SIZE,
        // which fits in i32.
        let declared = i32::try_from(self.message_length).unwrap_or(i32::MAX);
        let header = PacketHeader::new(
            self.magic_bytes,
            message_type,
            self.source_id,
            self.destination_id,
            declared,
        );

        Ok(Packet::from_parts(&header, message_type, self.payload.freeze()))
    }
}

/// Complete decoder state: current stage plus the partial packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeState {
    stage: Stage,
    partial: PartialPacket,
}

impl DecodeState {
    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// True if no packet is in progress.
    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Init
    }
}

/// Outcome of running one stage.
#[derive(Debug)]
pub struct Transition {
    /// State to run next.
    pub state: DecodeState,
    /// Packet completed by this step, if any.
    pub emitted: Option<Packet>,
    /// Packet dropped by this step, if any. Never fatal to the buffer.
    pub rejected: Option<ProtocolError>,
    /// Bytes consumed from the front of the input.
    pub consumed: usize,
    /// Whether the driving loop should run another step now.
    pub proceed: bool,
}

impl Transition {
    fn advance(stage: Stage, partial: PartialPacket, consumed: usize) -> Self {
        Self {
            state: DecodeState { stage, partial },
            emitted: None,
            rejected: None,
            consumed,
            proceed: true,
        }
    }

    fn halt(stage: Stage, partial: PartialPacket, consumed: usize) -> Self {
        Self {
            state: DecodeState { stage, partial },
            emitted: None,
            rejected: None,
            consumed,
            proceed: false,
        }
    }
}

/// Run the current stage against the buffered bytes.
///
/// Pure: the result depends only on `state` and `input`. Callers drop
/// `consumed` bytes from the front of their buffer and keep calling while
/// `proceed` is set.
///
/// # Errors
///
/// Hard failures after which the rest of the buffer cannot be interpreted:
///
/// - `ProtocolError::UnknownMessageType` from the Type stage
/// - `ProtocolError::NegativeLength` / `PayloadTooLarge` from the Length stage
pub fn transition(state: DecodeState, input: &[u8]) -> Result<Transition> {
    let DecodeState { stage, mut partial } = state;

    let step = match stage {
        Stage::Init => Transition::advance(Stage::Magic, PartialPacket::default(), 0),

        Stage::Magic => match read_i32(input) {
            Some(value) => {
                partial.magic_bytes = value;
                Transition::advance(Stage::Type, partial, 4)
            },
            None => Transition::halt(stage, partial, 0),
        },

        Stage::Type => match input.first_chunk::<2>() {
            Some(code) => {
                partial.message_type = Some(MessageType::from_code(*code)?);
                Transition::advance(Stage::Source, partial, 2)
            },
            None => Transition::halt(stage, partial, 0),
        },

        Stage::Source => match read_i32(input) {
            Some(value) => {
                partial.source_id = value;
                Transition::advance(Stage::Destination, partial, 4)
            },
            None => Transition::halt(stage, partial, 0),
        },

        Stage::Destination => match read_i32(input) {
            Some(value) => {
                partial.destination_id = value;
                Transition::advance(Stage::Length, partial, 4)
            },
            None => Transition::halt(stage, partial, 0),
        },

        Stage::Length => match read_i32(input) {
            Some(value) => {
                partial.message_length = checked_payload_len(value)?;
                partial.payload.reserve(partial.message_length);
                Transition::advance(Stage::Payload, partial, 4)
            },
            None => Transition::halt(stage, partial, 0),
        },

        Stage::Payload => payload_step(partial, input),

        Stage::Done => {
            let (emitted, rejected) = match partial.finish() {
                Ok(packet) => (Some(packet), None),
                Err(err) => (None, Some(err)),
            };

            Transition {
                state: DecodeState::default(),
                emitted,
                rejected,
                consumed: 0,
                proceed: !input.is_empty(),
            }
        },
    };

    Ok(step)
}

/// Payload stage.
///
/// - Nothing left to collect: the packet is complete.
/// - Buffer empty: Login and Logout close immediately; other kinds wait.
/// - Fewer bytes than needed: take them all and wait for the rest.
/// - Enough bytes: take exactly what is missing and complete.
fn payload_step(mut partial: PartialPacket, input: &[u8]) -> Transition {
    let remaining = partial.remaining();

    if remaining == 0 {
        return Transition::advance(Stage::Done, partial, 0);
    }

    if input.is_empty() {
        let payload_less = partial.message_type.is_some_and(MessageType::is_payload_less);
        return if payload_less {
            Transition::advance(Stage::Done, partial, 0)
        } else {
            Transition::halt(Stage::Payload, partial, 0)
        };
    }

    match input.get(..remaining) {
        Some(rest) => {
            partial.payload.extend_from_slice(rest);
            Transition::advance(Stage::Done, partial, remaining)
        },
        None => {
            partial.payload.extend_from_slice(input);
            Transition::halt(Stage::Payload, partial, input.len())
        },
    }
}

fn read_i32(input: &[u8]) -> Option<i32> {
    input.first_chunk::<4>().map(|bytes| i32::from_be_bytes(*bytes))
}

/// Packets and rejections produced by one [`Decoder::feed`] call.
#[derive(Debug, Default)]
pub struct Decoded {
    /// Completed packets, in stream order.
    pub packets: Vec<Packet>,
    /// Packets or bytes that were dropped, in stream order.
    pub rejected: Vec<ProtocolError>,
}

impl Decoded {
    /// True if nothing was produced.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.rejected.is_empty()
    }
}

/// Byte-stream decoder for a single connection.
///
/// Owns the bytes received but not yet consumed, plus the stage cursor. Keep
/// one per connection for as long as the connection lives; discarding it
/// between reads would truncate any packet that straddles a read boundary.
///
/// # Framing loss
///
/// A LOGIN or LOGOUT packet is closed as soon as the buffer runs dry after
/// its header. If a read ends exactly on the 18-byte header of such a packet
/// while it declares a non-empty payload, the packet is rejected with
/// `ProtocolError::ShortPayload`, and the payload bytes that arrive next are
/// decoded as a new header. The stream stays misframed until a later error
/// clears the buffer. Clients never send a payload with these types, so the
/// decoder keeps this behaviour rather than waiting for the declared length.
#[derive(Debug, Default)]
pub struct Decoder {
    state: DecodeState,
    pending: BytesMut,
}

impl Decoder {
    /// Create an idle decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `block` and decode as many packets as it completes.
    ///
    /// On a hard failure (see [`transition`]) every buffered byte is
    /// discarded and the decoder returns to `Init`; the error is reported in
    /// [`Decoded::rejected`] and the next block starts a fresh packet.
    pub fn feed(&mut self, block: &[u8]) -> Decoded {
        self.pending.extend_from_slice(block);

        let mut decoded = Decoded::default();
        if self.pending.is_empty() && self.state.is_idle() {
            return decoded;
        }

        let mut proceed = true;

        while proceed {
            let state = std::mem::take(&mut self.state);

            match transition(state, &self.pending) {
                Ok(step) => {
                    self.pending.advance(step.consumed);
                    self.state = step.state;
                    decoded.packets.extend(step.emitted);
                    decoded.rejected.extend(step.rejected);
                    proceed = step.proceed;
                },
                Err(err) => {
                    self.reset();
                    decoded.rejected.push(err);
                    proceed = false;
                },
            }
        }

        decoded
    }

    /// Drop buffered bytes and any packet in progress.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.state = DecodeState::default();
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    /// Bytes buffered but not yet consumed by a stage.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
