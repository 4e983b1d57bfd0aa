//! Configuration
//!
//! [`RconConfig`] is the immutable snapshot a listener is bound with. It is
//! shared by every connection of that listener behind an `Arc` and never
//! changes underneath a live session; picking up new values means rebinding
//! (see [`crate::server::RconService::reload`]).
//!
//! The standalone binary builds the snapshot from command-line arguments
//! merged over an optional TOML file. CLI arguments take precedence.
//!
//! ```toml
//! [rcon]
//! port = 25570
//! password = "change-me"
//! colored = true
//! debug = false
//! log-errors = false
//! idle-timeout-secs = 90
//!
//! [rcon.messages]
//! no-command = "No such command"
//!
//! [logging]
//! level = "info"
//! ```

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default RCON port
pub const DEFAULT_PORT: u16 = 25570;

/// Default bind host (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default password shipped with a fresh config
pub const DEFAULT_PASSWORD: &str = "password";

/// Connections silent for longer than this are closed
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Localized strings the session sends back to clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Messages {
    pub no_command: String,
    pub unknown_error: String,
    pub error_executing: String,
    pub unknown_request: String,
    /// Debug notice template; `{address}` and `{command}` are substituted
    pub connect_notify: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            no_command: "No such command".to_string(),
            unknown_error: "Unknown error".to_string(),
            error_executing: "Error executing:".to_string(),
            unknown_request: "Unknown request".to_string(),
            connect_notify: "Rcon connection from: [{address}] Command: {command}".to_string(),
        }
    }
}

impl Messages {
    /// Renders the debug notice for a command received from `address`.
    pub fn connect_notice(&self, address: &str, command: &str) -> String {
        self.connect_notify
            .replace("{address}", address)
            .replace("{command}", command)
    }
}

/// Settings snapshot for one bound listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Keep colour codes in responses
    pub colored: bool,
    /// Log and broadcast every received command
    pub debug: bool,
    /// Send detailed failure messages and log execution errors
    pub log_errors: bool,
    pub idle_timeout_secs: u64,
    pub messages: Messages,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: DEFAULT_PASSWORD.to_string(),
            colored: true,
            debug: false,
            log_errors: false,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            messages: Messages::default(),
        }
    }
}

impl RconConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Rejects settings a listener cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::Invalid("password must not be empty".to_string()));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "idle-timeout-secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub rcon: RconConfig,
    pub logging: LoggingConfig,
}

impl FileConfig {
    /// Parses a TOML document; `path` only labels errors.
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }
}

/// Command-line arguments for the standalone server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "rcon-server")]
#[command(version)]
#[command(about = "A standalone Source RCON server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// RCON password
    #[arg(long)]
    pub password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Final resolved configuration for the binary
#[derive(Debug, Clone)]
pub struct Settings {
    pub rcon: RconConfig,
    pub log_level: String,
}

impl CliArgs {
    /// Loads the TOML file (if any) and applies CLI overrides on top.
    ///
    /// Called again on reload, so a changed file is picked up while CLI
    /// overrides keep winning.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let file = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    fn merge(&self, file: FileConfig) -> Result<Settings, ConfigError> {
        let mut rcon = file.rcon;
        if let Some(host) = &self.host {
            rcon.host = host.clone();
        }
        if let Some(port) = self.port {
            rcon.port = port;
        }
        if let Some(password) = &self.password {
            rcon.password = password.clone();
        }
        rcon.validate()?;

        Ok(Settings {
            rcon,
            log_level: self.log_level.clone().unwrap_or(file.logging.level),
        })
    }
}
