//! Listener and Lifecycle
//!
//! [`RconServer`] owns one bound TCP listener. Binding spawns a single
//! acceptor task; every accepted socket becomes a connection task on the
//! runtime's worker pool. [`RconServer::shutdown`] stops accepting, lets
//! each live connection finish its in-flight command, waits for them to
//! close and releases the socket.
//!
//! [`RconService`] is the host-facing wrapper with enable/disable/reload.
//! A reload is a full stop-then-start cycle under a lock, so two rebinds
//! never race and live sessions never see a half-updated configuration.
//!
//! ## Shutdown Sequence
//!
//! ```text
//! shutdown()
//!     │  watch::send(true)
//!     ▼
//! acceptor ──> drops the listener (no new clients)
//!     │
//!     ▼
//! connections ──> finish in-flight command, close
//!     │          (aborted after SHUTDOWN_GRACE)
//!     ▼
//! acceptor task ends
//! ```

use crate::config::{ConfigError, RconConfig};
use crate::connection::{handle_connection, ConnectionHandler, ConnectionStats};
use crate::host::Host;
use crate::session::SessionHandler;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Pending-connection queue length for the listening socket.
const LISTEN_BACKLOG: u32 = 1024;

/// How long shutdown waits for live connections before aborting them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that can occur while binding the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not resolve bind address '{0}'")]
    Resolve(String),

    #[error("RCON bind error on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Worker threads for the runtime servicing connections.
pub fn worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(2)
}

/// A bound RCON listener.
#[derive(Debug)]
pub struct RconServer {
    local_addr: SocketAddr,
    config: Arc<RconConfig>,
    stats: Arc<ConnectionStats>,
    shutdown_tx: watch::Sender<bool>,
    acceptor: Option<JoinHandle<()>>,
}

impl RconServer {
    /// Binds the listener and starts accepting connections.
    ///
    /// `config` becomes the snapshot every session of this listener sees.
    pub async fn bind(config: RconConfig, host: Host) -> Result<Self, ServerError> {
        config.validate()?;
        let config = Arc::new(config);

        let listener = bind_listener(&config.bind_address()).await?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: config.bind_address(),
            source,
        })?;
        info!(address = %local_addr, "Binding rcon to address");

        let stats = Arc::new(ConnectionStats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let acceptor = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&config),
            host,
            Arc::clone(&stats),
            shutdown_rx,
        ));

        Ok(Self {
            local_addr,
            config,
            stats,
            shutdown_tx,
            acceptor: Some(acceptor),
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &RconConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Stops accepting, drains connections and releases the listener.
    pub async fn shutdown(mut self) {
        info!(address = %self.local_addr, "Trying to stop RCON listener");
        let _ = self.shutdown_tx.send(true);

        if let Some(acceptor) = self.acceptor.take() {
            if let Err(e) = acceptor.await {
                debug!(error = %e, "Acceptor task ended abnormally");
            }
        }

        info!(address = %self.local_addr, "RCON listener stopped");
    }
}

impl Drop for RconServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Resolves `addr` and opens a listening socket on it.
async fn bind_listener(addr: &str) -> Result<TcpListener, ServerError> {
    let bind_err = |source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    };

    let socket_addr = tokio::net::lookup_host(addr)
        .await
        .map_err(bind_err)?
        .next()
        .ok_or_else(|| ServerError::Resolve(addr.to_string()))?;

    let socket = if socket_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(socket_addr).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)
}

/// Accepts clients until shutdown, then drains them.
async fn accept_loop(
    listener: TcpListener,
    config: Arc<RconConfig>,
    host: Host,
    stats: Arc<ConnectionStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let connection_shutdown = shutdown_rx.clone();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let session = SessionHandler::new(Arc::clone(&config), host.clone(), addr);
                    let handler = ConnectionHandler::new(
                        stream,
                        addr,
                        session,
                        Arc::clone(&host.control),
                        Arc::clone(&stats),
                        config.idle_timeout(),
                    )
                    .with_shutdown(connection_shutdown.clone());

                    connections.spawn(handle_connection(handler));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_requested(&mut shutdown_rx) => break,
        }
    }

    drop(listener);
    debug!(connections = connections.len(), "Listener closed, draining connections");

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = connections.len(),
            "Connections still busy after shutdown grace period, aborting"
        );
        connections.shutdown().await;
    }
}

/// Resolves once the shutdown flag is raised or its sender is gone.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Host-facing module wrapper around a rebindable [`RconServer`].
pub struct RconService {
    host: Host,
    server: Mutex<Option<RconServer>>,
}

impl RconService {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            server: Mutex::new(None),
        }
    }

    /// Starts the listener, replacing any running one.
    ///
    /// On a bind failure the error is logged and returned, and the service
    /// stays disabled.
    pub async fn enable(&self, config: RconConfig) -> Result<SocketAddr, ServerError> {
        let mut slot = self.server.lock().await;
        if let Some(running) = slot.take() {
            running.shutdown().await;
        }
        self.start(&mut slot, config).await
    }

    /// Stops the listener if it is running.
    pub async fn disable(&self) {
        let mut slot = self.server.lock().await;
        if let Some(running) = slot.take() {
            running.shutdown().await;
        }
    }

    /// Stop-then-start with a fresh configuration snapshot.
    pub async fn reload(&self, config: RconConfig) -> Result<SocketAddr, ServerError> {
        info!("Reloading RCON listener");
        self.enable(config).await
    }

    pub async fn is_enabled(&self) -> bool {
        self.server.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(RconServer::local_addr)
    }

    pub async fn stats(&self) -> Option<Arc<ConnectionStats>> {
        self.server.lock().await.as_ref().map(RconServer::stats)
    }

    async fn start(
        &self,
        slot: &mut Option<RconServer>,
        config: RconConfig,
    ) -> Result<SocketAddr, ServerError> {
        match RconServer::bind(config, self.host.clone()).await {
            Ok(server) => {
                let addr = server.local_addr();
                *slot = Some(server);
                Ok(addr)
            }
            Err(e) => {
                error!(error = %e, "Failed to start RCON listener");
                Err(e)
            }
        }
    }
}
