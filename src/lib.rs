//! # rcon-server - An Embeddable Source RCON Server
//!
//! A from-scratch implementation of the Source RCON protocol for Tokio
//! applications. The host application plugs in a command executor; this
//! crate handles the socket, the framing, authentication, response
//! chunking and connection lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            rcon-server                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ RconServer  │───>│ Connection  │───>│  Session    │                  │
//! │  │ (acceptor)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌─────────────┐                  │
//! │                     │ Frame codec │    │ Response    │                  │
//! │                     │ + Packet    │    │ Sink        │                  │
//! │                     └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! └───────────────────────────────────────────────┼─────────────────────────┘
//!                                                 ▼
//!                                   CommandExecutor (host application)
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use rcon_server::{Host, RconConfig, RconServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RconConfig {
//!         password: "change-me".to_string(),
//!         ..Default::default()
//!     };
//!     let host = Host::new(Arc::new(MyExecutor));
//!
//!     let server = RconServer::bind(config, host).await.unwrap();
//!     // ... run the application ...
//!     server.shutdown().await;
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame codec and packet types
//! - [`session`]: authentication/command state machine and output capture
//! - [`connection`]: per-client read/write loop with idle guard
//! - [`server`]: listener, graceful shutdown and rebinding
//! - [`host`]: traits the embedding application implements
//! - [`config`]: configuration snapshot and loader
//!
//! ## Wire Format
//!
//! Each message is `i32 length (LE)` + `i32 request id` + `i32 type` +
//! UTF-8 body + two null bytes. Frames above 4096 bytes (or with a negative
//! length) close the connection; responses are split into 2048-byte
//! packets.

pub mod builtin;
pub mod config;
pub mod connection;
pub mod host;
pub mod protocol;
pub mod server;
pub mod session;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use config::{ConfigError, RconConfig};
pub use connection::{ConnectionError, ConnectionStats};
pub use host::{CommandExecutor, ExecutorError, Host, HostControl, Notifier, Translator};
pub use protocol::{FrameError, Packet, PacketKind};
pub use server::{RconServer, RconService, ServerError};
pub use session::{OutputLine, ResponseSink};

/// The default port the RCON server listens on
pub const DEFAULT_PORT: u16 = config::DEFAULT_PORT;

/// Version of rcon-server
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
