//! RCON Packet Types
//!
//! A packet is the logical unit carried inside one frame:
//!
//! ```text
//! ┌───────────────────────┬──────────────────┬──────────────┬──────────┐
//! │ request_id: i32 (LE)  │ type: i32 (LE)   │ body (UTF-8) │ 0x00 0x00│
//! └───────────────────────┴──────────────────┴──────────────┴──────────┘
//! ```
//!
//! ## Packet Types
//!
//! - `3` Auth: the client sends the password in the body
//! - `2` Command (client → server), also the auth acknowledgement
//!   (server → client); the direction tells them apart
//! - `0` Response: command output (server → client)
//!
//! Any other code is kept as [`PacketKind::Unknown`] so the session can
//! answer it instead of tearing the connection down.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Request id the server uses to signal an authentication failure.
pub const FAILURE_ID: i32 = -1;

/// Bytes taken by `request_id` and `type`.
pub const HEADER_SIZE: usize = 8;

/// The two trailing null bytes every packet ends with.
pub const PADDING: [u8; 2] = [0, 0];

/// Wire type codes.
pub mod code {
    pub const RESPONSE: i32 = 0;
    pub const COMMAND: i32 = 2;
    pub const AUTH: i32 = 3;
}

/// Errors that can occur while decoding a packet from a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The frame holds a header but not the two padding bytes
    #[error("truncated packet: {0} bytes")]
    Truncated(usize),
}

/// The packet type, decoded once into a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Login request carrying the password
    Auth,
    /// Command request, or the auth acknowledgement when sent by the server
    Command,
    /// Command output
    Response,
    /// Anything else, with the raw code preserved
    Unknown(i32),
}

impl PacketKind {
    /// The server-to-client acknowledgement of an auth attempt.
    pub const AUTH_RESPONSE: PacketKind = PacketKind::Command;

    /// Maps a wire code onto a kind.
    pub fn from_code(code: i32) -> Self {
        match code {
            code::AUTH => PacketKind::Auth,
            code::COMMAND => PacketKind::Command,
            code::RESPONSE => PacketKind::Response,
            other => PacketKind::Unknown(other),
        }
    }

    /// Returns the wire code for this kind.
    pub fn code(self) -> i32 {
        match self {
            PacketKind::Auth => code::AUTH,
            PacketKind::Command => code::COMMAND,
            PacketKind::Response => code::RESPONSE,
            PacketKind::Unknown(other) => other,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Auth => write!(f, "AUTH"),
            PacketKind::Command => write!(f, "COMMAND"),
            PacketKind::Response => write!(f, "RESPONSE"),
            PacketKind::Unknown(code) => write!(f, "UNKNOWN({:#x})", code),
        }
    }
}

/// A decoded RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: i32,
    pub kind: PacketKind,
    pub body: String,
}

impl Packet {
    /// Creates a packet.
    pub fn new(request_id: i32, kind: PacketKind, body: impl Into<String>) -> Self {
        Self {
            request_id,
            kind,
            body: body.into(),
        }
    }

    /// Creates a `Response` packet.
    pub fn response(request_id: i32, body: impl Into<String>) -> Self {
        Self::new(request_id, PacketKind::Response, body)
    }

    /// Creates an empty `Response` packet.
    pub fn empty_response(request_id: i32) -> Self {
        Self::response(request_id, String::new())
    }

    /// Creates an empty auth acknowledgement.
    pub fn auth_response(request_id: i32) -> Self {
        Self::new(request_id, PacketKind::AUTH_RESPONSE, String::new())
    }

    /// Decodes a packet from one frame payload.
    ///
    /// Returns `Ok(None)` for a frame too short to hold a header; such
    /// frames are dropped without an answer. The last two bytes are
    /// treated as padding whatever their value, and invalid UTF-8 in the
    /// body is replaced rather than rejected.
    pub fn decode(frame: &[u8]) -> Result<Option<Packet>, PacketError> {
        if frame.len() < HEADER_SIZE {
            return Ok(None);
        }
        if frame.len() < HEADER_SIZE + PADDING.len() {
            return Err(PacketError::Truncated(frame.len()));
        }

        let (header, rest) = frame.split_at(HEADER_SIZE);
        let request_id = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let kind = PacketKind::from_code(i32::from_le_bytes([
            header[4], header[5], header[6], header[7],
        ]));
        let body = &rest[..rest.len() - PADDING.len()];

        Ok(Some(Packet {
            request_id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        }))
    }

    /// Number of payload bytes this packet encodes to (without framing).
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body.len() + PADDING.len()
    }

    /// Appends the packet payload (header, body, padding) to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_i32_le(self.request_id);
        dst.put_i32_le(self.kind.code());
        dst.put_slice(self.body.as_bytes());
        dst.put_slice(&PADDING);
    }

    /// Encodes the packet payload into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} id={} body={} bytes",
            self.kind,
            self.request_id,
            self.body.len()
        )
    }
}
