//! Relay chat wire protocol.
//!
//! Pure data and pure functions: no sockets, no threads, no clocks. The
//! server crate feeds bytes in and writes encoded packets out; everything in
//! between lives here.
//!
//! # Wire format
//!
//! ```text
//! [magic: i32][type: 2 ASCII][source: i32][destination: i32][length: i32][message: length bytes]
//! ```
//!
//! All integers are big-endian. There is no version byte, no checksum and no
//! framing beyond the embedded length.
//!
//! # Components
//!
//! - [`MessageType`]: the four packet kinds and their two-byte codes
//! - [`PacketHeader`]: fixed 18-byte header, zero-copy parsed
//! - [`Packet`]: header plus payload, with whole-frame encode/decode
//! - [`Decoder`]: staged state machine that assembles packets from an
//!   arbitrarily fragmented byte stream


pub mod decoder;
pub mod errors;
mod header;
mod message_type;
mod packet;

pub use decoder::{DecodeState, Decoded, Decoder, Stage, Transition, transition};
pub use errors::{ProtocolError, Result};
pub use header::PacketHeader;
pub use message_type::MessageType;
pub use packet::{
    ClientId, INVALID_DESTINATION_MESSAGE, MAX_PAYLOAD_SIZE, NO_MAGIC_BYTES, Packet, SERVER_ID,
};
