//! Connection Handler Module
//!
//! This module drives one client socket. Each client gets its own task that
//! runs in a loop, reading frames and writing replies, until the client
//! leaves, breaks the protocol, goes idle or the server shuts down.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes (idle guard) │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Split frame, decode     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ SessionHandler::handle  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Write + flush reply     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / violation / idle / shutdown
//!        │
//!        ▼
//! 5. Handler task ends, socket and buffers dropped
//! ```
//!
//! ## One Command In Flight
//!
//! A packet is fully handled, including awaiting the host executor and
//! flushing the reply, before the next frame is looked at. Commands from
//! one client therefore run strictly in order, while the worker thread is
//! free to serve other connections during the await.

use crate::host::HostControl;
use crate::protocol::{encode_frame, FrameError, FrameParser, Packet, PacketError};
use crate::session::SessionHandler;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity: one maximum-size frame plus its prefix
const INITIAL_BUFFER_SIZE: usize = 4096 + 4;

/// Upper bound on flushing and closing the socket after the loop ends
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total packets handled
    pub packets_processed: AtomicU64,
    /// Connections closed for an invalid frame
    pub protocol_violations: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn packet_processed(&self) {
        self.packets_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the stream so tests can drive it with in-memory pipes.
pub struct ConnectionHandler<S> {
    /// The client stream
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Frame splitter
    parser: FrameParser,

    /// Per-connection protocol state
    session: SessionHandler,

    /// Used to stop the host after a `stop` command
    control: Arc<dyn HostControl>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Close after this long without reads or writes
    idle_timeout: Duration,

    /// Last read or write on the socket
    last_activity: Instant,

    /// Server shutdown signal; `None` never fires
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `session` - Protocol state machine for this client
    /// * `control` - Host control used after a stop command
    /// * `stats` - Shared connection statistics
    /// * `idle_timeout` - Silence after which the connection is closed
    pub fn new(
        stream: S,
        addr: SocketAddr,
        session: SessionHandler,
        control: Arc<dyn HostControl>,
        stats: Arc<ConnectionStats>,
        idle_timeout: Duration,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: FrameParser::new(),
            session,
            control,
            stats,
            idle_timeout,
            last_activity: Instant::now(),
            shutdown: None,
        }
    }

    /// Closes the connection once `shutdown` turns true (or its sender is
    /// dropped). An in-flight command still completes and is answered.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Runs the main connection loop.
    ///
    /// Reads frames from the client, handles them, and sends back replies
    /// until the client disconnects or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "RCON client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "RCON client disconnected"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IdleTimeout(idle) => {
                    debug!(client = %self.addr, idle_secs = idle.as_secs(), "Closing idle connection")
                }
                ConnectionError::Frame(frame_err) => {
                    self.stats.protocol_violation();
                    warn!(client = %self.addr, error = %frame_err, "RCON received invalid packet size")
                }
                e if e.is_reset() => {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "RCON pipeline error"),
            },
        }

        // A peer that stopped reading would otherwise hold the close forever
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, self.stream.shutdown()).await;
        self.stats.connection_closed();
        result
    }

    /// The main read-handle-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.try_parse_frame()? {
                let packet = match Packet::decode(&frame)? {
                    Some(packet) => packet,
                    None => {
                        trace!(client = %self.addr, len = frame.len(), "Ignoring headerless frame");
                        continue;
                    }
                };
                trace!(client = %self.addr, packet = %packet, "Received packet");

                let reply = self.session.handle(packet).await;
                self.stats.packet_processed();
                self.send_packets(&reply.packets).await?;

                if reply.shutdown {
                    info!(client = %self.addr, "Stop command answered, shutting down host");
                    self.control.shutdown();
                }
            }

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Attempts to split a frame from the buffer.
    fn try_parse_frame(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        match self.parser.parse(&self.buffer)? {
            Some((frame, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Split frame"
                );
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Returns `Ok(false)` when the server is shutting down.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let deadline = self.last_activity + self.idle_timeout;
        let read = tokio::time::timeout_at(
            deadline,
            self.stream.get_mut().read_buf(&mut self.buffer),
        );

        let n = tokio::select! {
            result = read => match result {
                Ok(read) => read?,
                Err(_) => return Err(ConnectionError::IdleTimeout(self.idle_timeout)),
            },
            _ = shutdown_signalled(&mut self.shutdown) => {
                debug!(client = %self.addr, "Closing connection for server shutdown");
                return Ok(false);
            }
        };

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.last_activity = Instant::now();
        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Writes every packet of a reply, in order, then flushes once.
    ///
    /// The write shares the idle deadline with reads, so a client that
    /// stops reading is dropped like one that stops sending.
    async fn send_packets(&mut self, packets: &[Packet]) -> Result<(), ConnectionError> {
        let mut out = BytesMut::new();
        for packet in packets {
            encode_frame(&packet.encode(), &mut out);
        }

        let deadline = self.last_activity + self.idle_timeout;
        let stream = &mut self.stream;
        let write = async {
            stream.write_all(&out).await?;
            stream.flush().await
        };
        match tokio::time::timeout_at(deadline, write).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::IdleTimeout(self.idle_timeout)),
        }
        self.last_activity = Instant::now();
        self.stats.bytes_written(out.len());
        trace!(
            client = %self.addr,
            packets = packets.len(),
            bytes = out.len(),
            "Sent reply"
        );
        Ok(())
    }
}

/// Resolves when the shutdown flag is raised or its sender goes away.
async fn shutdown_signalled(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            let _ = rx.wait_for(|stop| *stop).await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Frame length out of bounds
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Frame too short to be a packet
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial frame)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// No traffic for the configured idle timeout
    #[error("idle for {0:?}")]
    IdleTimeout(Duration),
}

impl ConnectionError {
    /// True for the errors an abrupt client disconnect produces.
    pub fn is_reset(&self) -> bool {
        match self {
            ConnectionError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            ConnectionError::UnexpectedEof => true,
            _ => false,
        }
    }
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion, swallowing expected disconnect errors.
pub async fn handle_connection<S>(handler: ConnectionHandler<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let addr = handler.addr;
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected | ConnectionError::IdleTimeout(_) => {}
            ref e if e.is_reset() => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
