//! RCON Protocol Implementation
//!
//! This module implements the Source RCON wire format in two layers.
//!
//! ## Modules
//!
//! - `frame`: splits the byte stream into length-prefixed frames
//! - `packet`: decodes a frame into a [`Packet`] and back
//!
//! ## Example
//!
//! ```ignore
//! use rcon_server::protocol::{encode_frame, parse_frame, Packet};
//! use bytes::BytesMut;
//!
//! // Framing an outgoing packet
//! let mut out = BytesMut::new();
//! encode_frame(&Packet::response(1, "ok").encode(), &mut out);
//!
//! // Reading it back
//! let (frame, consumed) = parse_frame(&out).unwrap().unwrap();
//! let packet = Packet::decode(&frame).unwrap().unwrap();
//! ```

pub mod frame;
pub mod packet;

// Re-export commonly used types for convenience
pub use frame::{encode_frame, parse_frame, FrameError, FrameParser, MAX_PACKET_SIZE};
pub use packet::{Packet, PacketError, PacketKind, FAILURE_ID};
