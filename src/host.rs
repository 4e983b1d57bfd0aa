//! Host Collaborators
//!
//! The RCON server runs embedded in a larger application. Everything it
//! needs from that application goes through the traits in this module:
//!
//! - [`CommandExecutor`] runs a command string and writes its output into a
//!   [`ResponseSink`]
//! - [`Notifier`] fans a one-line notice out to privileged observers
//! - [`Translator`] resolves translatable output lines
//! - [`HostControl`] shuts the host down after a `stop` command
//!
//! [`Host`] bundles them for [`crate::server::RconServer::bind`].

use crate::session::ResponseSink;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// A command failed while executing inside the host.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExecutorError {
    message: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes command lines on behalf of an authenticated RCON client.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs `command`, writing any output into `sink`.
    ///
    /// Returns `Ok(true)` when a matching command existed and ran,
    /// `Ok(false)` when no such command exists.
    async fn execute(&self, sink: &mut ResponseSink, command: &str) -> Result<bool, ExecutorError>;
}

/// Delivers notices to observers holding a permission.
pub trait Notifier: Send + Sync {
    fn notify(&self, permission: &str, message: &str);
}

/// Looks up translations for [`crate::session::OutputLine::Translatable`].
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, locale: &str) -> Option<String>;
}

/// Lets the server ask the host to shut down.
pub trait HostControl: Send + Sync {
    fn shutdown(&self);
}

/// A notifier that drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _permission: &str, _message: &str) {}
}

/// A translator without any translations; lines fall back to their key.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTranslations;

impl Translator for NoTranslations {
    fn translate(&self, _key: &str, _locale: &str) -> Option<String> {
        None
    }
}

/// Host control that ignores shutdown requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHostControl;

impl HostControl for NoopHostControl {
    fn shutdown(&self) {}
}

/// Everything the server borrows from the embedding application.
#[derive(Clone)]
pub struct Host {
    pub executor: Arc<dyn CommandExecutor>,
    pub notifier: Arc<dyn Notifier>,
    pub translator: Arc<dyn Translator>,
    pub control: Arc<dyn HostControl>,
    /// Primary locale for rendering translatable output
    pub locale: String,
}

impl Host {
    /// Creates a host around `executor` with no-op collaborators.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            notifier: Arc::new(NoopNotifier),
            translator: Arc::new(NoTranslations),
            control: Arc::new(NoopHostControl),
            locale: crate::session::FALLBACK_LOCALE.to_string(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_control(mut self, control: Arc<dyn HostControl>) -> Self {
        self.control = control;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").field("locale", &self.locale).finish_non_exhaustive()
    }
}
