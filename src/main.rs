//! rcon-server - standalone Source RCON server
//!
//! Runs the RCON listener with the built-in command set. Configuration comes
//! from a TOML file and/or command-line flags; SIGHUP re-reads both and
//! rebinds.

use anyhow::Context;
use clap::Parser;
use rcon_server::builtin::{BuiltinExecutor, LogNotifier};
use rcon_server::config::{CliArgs, Settings};
use rcon_server::server::{self, RconService};
use rcon_server::{Host, HostControl};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Wakes `main` when a client runs `stop`.
#[derive(Debug, Default)]
struct StopSignal {
    notify: Notify,
}

impl HostControl for StopSignal {
    fn shutdown(&self) {
        self.notify.notify_one();
    }
}

fn print_banner(settings: &Settings) {
    println!(
        r#"
rcon-server v{} - Source RCON server
──────────────────────────────────────────────────────────────
Listening on {}
Commands: help, ping, echo, version, uptime, stop

Use Ctrl+C to shutdown gracefully.
"#,
        rcon_server::VERSION,
        settings.rcon.bind_address()
    );
}

fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let settings = cli.resolve()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(server::worker_threads())
        .thread_name("rcon-worker")
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(run(cli, settings))
}

async fn run(cli: CliArgs, settings: Settings) -> anyhow::Result<()> {
    let stop = Arc::new(StopSignal::default());
    let host = Host::new(Arc::new(BuiltinExecutor::new()))
        .with_notifier(Arc::new(LogNotifier))
        .with_control(Arc::clone(&stop) as Arc<dyn HostControl>);

    let service = RconService::new(host);
    service.enable(settings.rcon.clone()).await?;
    print_banner(&settings);

    let mut reload = reload_signal().context("failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                info!("Shutdown signal received, stopping server...");
                break;
            }
            _ = stop.notify.notified() => {
                info!("Stop requested over RCON, stopping server...");
                break;
            }
            _ = reload_requested(&mut reload) => {
                info!("Reload requested");
                match cli.resolve() {
                    Ok(settings) => match service.reload(settings.rcon).await {
                        Ok(addr) => info!(addr = %addr, "RCON listener rebound"),
                        Err(e) => error!(error = %e, "Failed to rebind RCON listener"),
                    },
                    Err(e) => error!(error = %e, "Failed to reload configuration"),
                }
            }
        }
    }

    service.disable().await;
    info!("Server shutdown complete");
    Ok(())
}

#[cfg(unix)]
type ReloadSignal = signal::unix::Signal;

#[cfg(unix)]
fn reload_signal() -> std::io::Result<ReloadSignal> {
    signal::unix::signal(signal::unix::SignalKind::hangup())
}

#[cfg(unix)]
async fn reload_requested(sig: &mut ReloadSignal) {
    sig.recv().await;
}

#[cfg(not(unix))]
struct ReloadSignal;

#[cfg(not(unix))]
fn reload_signal() -> std::io::Result<ReloadSignal> {
    Ok(ReloadSignal)
}

#[cfg(not(unix))]
async fn reload_requested(_sig: &mut ReloadSignal) {
    std::future::pending::<()>().await
}
