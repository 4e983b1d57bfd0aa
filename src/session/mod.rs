//! RCON Session Layer
//!
//! Everything between a decoded packet and the packets sent back:
//!
//! - `handler`: the authentication/command state machine
//! - `sink`: captures one command's output as plain text
//! - `text`: colour-code stripping and response chunking
//!
//! ```text
//! Packet ──> SessionHandler ──> CommandExecutor (host)
//!                  │                    │
//!                  │             ResponseSink::send()
//!                  ▼                    │
//!            ResponseSink::flush() <────┘
//!                  │
//!                  ▼
//!          Reply { packets, shutdown }
//! ```

pub mod handler;
pub mod sink;
pub mod text;

// Re-export commonly used types
pub use handler::{Reply, SessionHandler, SessionState};
pub use sink::{OutputLine, ResponseSink, FALLBACK_LOCALE};
pub use text::{chunk_message, strip_colors, MAX_CHUNK_SIZE};
