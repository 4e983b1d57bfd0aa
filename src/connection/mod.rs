//! Connection Driver
//!
//! One task per accepted socket. The task owns the read buffer, the
//! [`SessionHandler`](crate::session::SessionHandler) and the write half;
//! nothing about a client is shared except the [`ConnectionStats`] counters.
//!
//! A connection ends for one of four reasons:
//!
//! ```text
//!                 ┌─ length < 0 or > 4096 ──> close, no reply (violation)
//!                 │
//!  read / write ──┼─ no traffic either way for idle_timeout ──> close
//!                 │
//!                 ├─ EOF or reset from the client ──> close
//!                 │
//!                 └─ shutdown watch = true ──> answer in-flight command, close
//! ```
//!
//! A `stop` reply is flushed first; only then is the host asked to shut
//! down.

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
