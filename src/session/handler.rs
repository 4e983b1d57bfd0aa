//! Protocol Session Handler
//!
//! The per-connection RCON state machine. It consumes decoded packets and
//! produces the packets to send back; it never touches the socket, which
//! keeps it testable without a network.
//!
//! ## States
//!
//! ```text
//!                 AUTH (password ok)
//!  Unauthenticated ─────────────────> Authenticated
//!        ▲                                  │
//!        └──────────────────────────────────┘
//!                 AUTH (password wrong)
//! ```
//!
//! ## Replies
//!
//! | Incoming                     | Outgoing                                        |
//! |------------------------------|-------------------------------------------------|
//! | AUTH, password ok            | `(id, RESPONSE, "")`, `(id, AUTH_RESPONSE, "")` |
//! | AUTH, password wrong         | `(-1, RESPONSE, "")`, `(-1, AUTH_RESPONSE, "")` |
//! | COMMAND, not authenticated   | `(-1, AUTH_RESPONSE, "")`                       |
//! | COMMAND, authenticated       | `(id, RESPONSE, "")` then one RESPONSE per chunk|
//! | anything else                | one RESPONSE per chunk of "unknown request"     |
//!
//! The empty RESPONSE packets in front of the auth acknowledgement and the
//! command output are not in the protocol text, but common clients wait for
//! them, so they are always sent.

use crate::config::RconConfig;
use crate::host::Host;
use crate::protocol::{Packet, PacketKind, FAILURE_ID};
use crate::session::sink::ResponseSink;
use crate::session::text::{chunk_message, strip_colors, MAX_CHUNK_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Commands that shut the host down instead of being dispatched.
const STOP_COMMANDS: [&str; 2] = ["stop", "end"];

/// Message returned for a stop command.
pub const SHUTDOWN_MESSAGE: &str = "Shutting down the proxy...";

/// Message returned for a failed command when detailed errors are off.
pub const GENERIC_FAILURE_MESSAGE: &str = "Command failed";

/// Permission observers need to receive debug notices.
pub const NOTIFY_PERMISSION: &str = "rcon.notify";

/// Authentication state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated,
}

/// What the connection should do after handling one packet.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reply {
    /// Packets to write, in order
    pub packets: Vec<Packet>,
    /// Shut the host down once `packets` are flushed
    pub shutdown: bool,
}

impl Reply {
    fn packets(packets: Vec<Packet>) -> Self {
        Self {
            packets,
            shutdown: false,
        }
    }
}

/// Result of running one command line.
struct Outcome {
    success: bool,
    message: String,
    shutdown: bool,
}

/// State machine for one RCON connection.
pub struct SessionHandler {
    config: Arc<RconConfig>,
    host: Host,
    peer: SocketAddr,
    state: SessionState,
}

impl SessionHandler {
    /// Creates a handler for the client at `peer`.
    pub fn new(config: Arc<RconConfig>, host: Host, peer: SocketAddr) -> Self {
        Self {
            config,
            host,
            peer,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Handles one packet and returns the reply.
    ///
    /// For an authenticated command this awaits the host executor; the
    /// caller must not feed the next packet before this returns.
    pub async fn handle(&mut self, packet: Packet) -> Reply {
        match packet.kind {
            PacketKind::Auth => self.handle_auth(packet.request_id, &packet.body),
            PacketKind::Command => self.handle_command(packet.request_id, &packet.body).await,
            PacketKind::Response | PacketKind::Unknown(_) => {
                self.handle_unknown(packet.request_id, packet.kind)
            }
        }
    }

    fn handle_auth(&mut self, request_id: i32, password: &str) -> Reply {
        let reply_id = if password == self.config.password {
            self.state = SessionState::Authenticated;
            info!(client = %self.peer, "RCON client authenticated");
            request_id
        } else {
            self.state = SessionState::Unauthenticated;
            info!(client = %self.peer, "RCON authentication failed");
            FAILURE_ID
        };

        Reply::packets(vec![
            Packet::empty_response(reply_id),
            Packet::auth_response(reply_id),
        ])
    }

    async fn handle_command(&mut self, request_id: i32, body: &str) -> Reply {
        if !self.is_authenticated() {
            debug!(client = %self.peer, "Command rejected before authentication");
            return Reply::packets(vec![Packet::auth_response(FAILURE_ID)]);
        }

        if self.config.debug {
            self.announce(body);
        }

        let command = body.trim();

        let outcome = self.run_command(command).await;
        let mut message = if outcome.success {
            outcome.message
        } else {
            self.failure_message(command, outcome.message)
        };

        if !self.config.colored {
            message = strip_colors(&message);
        }

        let mut packets = vec![Packet::empty_response(request_id)];
        packets.extend(chunk_packets(request_id, &message));

        Reply {
            packets,
            shutdown: outcome.shutdown,
        }
    }

    fn handle_unknown(&self, request_id: i32, kind: PacketKind) -> Reply {
        debug!(client = %self.peer, kind = %kind, "Unknown request type");
        let mut message = format!("{} {:x}", self.config.messages.unknown_request, kind.code());
        if !self.config.colored {
            message = strip_colors(&message);
        }
        Reply::packets(chunk_packets(request_id, &message).collect())
    }

    async fn run_command(&self, command: &str) -> Outcome {
        if STOP_COMMANDS
            .iter()
            .any(|stop| command.eq_ignore_ascii_case(stop))
        {
            info!(client = %self.peer, "Shutdown requested over RCON");
            return Outcome {
                success: true,
                message: SHUTDOWN_MESSAGE.to_string(),
                shutdown: true,
            };
        }

        let mut sink = ResponseSink::new(self.host.translator.clone(), self.host.locale.clone());
        let (success, message) = match self.host.executor.execute(&mut sink, command).await {
            Ok(true) => (true, sink.flush()),
            Ok(false) => (false, self.config.messages.no_command.clone()),
            Err(e) => {
                if self.config.log_errors {
                    error!(client = %self.peer, command = command, error = %e, "Command execution failed");
                }
                (false, self.config.messages.unknown_error.clone())
            }
        };

        Outcome {
            success,
            message,
            shutdown: false,
        }
    }

    /// Builds the client-facing text for a failed command.
    fn failure_message(&self, command: &str, reason: String) -> String {
        if !self.config.log_errors {
            return GENERIC_FAILURE_MESSAGE.to_string();
        }

        let detailed = format!(
            "{} {} ({})",
            self.config.messages.error_executing, command, reason
        );
        info!(client = %self.peer, "RCON error: {}", detailed);
        detailed
    }

    fn announce(&self, command: &str) {
        let notice = self
            .config
            .messages
            .connect_notice(&self.peer.to_string(), command);
        info!(client = %self.peer, "{}", notice);
        self.host.notifier.notify(NOTIFY_PERMISSION, &notice);
    }
}

/// Splits `message` into response packets sharing `request_id`.
pub fn chunk_packets(request_id: i32, message: &str) -> impl Iterator<Item = Packet> + '_ {
    chunk_message(message, MAX_CHUNK_SIZE)
        .into_iter()
        .map(move |chunk| Packet::response(request_id, chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CommandExecutor, ExecutorError, Notifier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Executor scripted by the command text.
    #[derive(Default)]
    struct ScriptedExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            sink: &mut ResponseSink,
            command: &str,
        ) -> Result<bool, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match command {
                "list" => {
                    sink.send("There are 2 players online:");
                    sink.send("§aAlice§r, Bob");
                    Ok(true)
                }
                "big" => {
                    sink.send("z".repeat(5000));
                    Ok(true)
                }
                "silent" => Ok(true),
                "boom" => Err(ExecutorError::new("backend exploded")),
                _ => Ok(false),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<(String, String)>>);

    impl Notifier for RecordingNotifier {
        fn notify(&self, permission: &str, message: &str) {
            self.0
                .lock()
                .unwrap()
                .push((permission.to_string(), message.to_string()));
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn session_with(config: RconConfig) -> (SessionHandler, Arc<ScriptedExecutor>) {
        let executor = Arc::new(ScriptedExecutor::default());
        let host = Host::new(executor.clone());
        (SessionHandler::new(Arc::new(config), host, peer()), executor)
    }

    fn session() -> (SessionHandler, Arc<ScriptedExecutor>) {
        session_with(RconConfig {
            password: "secret".to_string(),
            ..Default::default()
        })
    }

    async fn login(session: &mut SessionHandler) {
        session
            .handle(Packet::new(1, PacketKind::Auth, "secret"))
            .await;
        assert!(session.is_authenticated());
    }

    fn bodies(reply: &Reply) -> Vec<&str> {
        reply.packets.iter().map(|p| p.body.as_str()).collect()
    }

    #[tokio::test]
    async fn test_auth_success() {
        let (mut session, _) = session();
        let reply = session
            .handle(Packet::new(77, PacketKind::Auth, "secret"))
            .await;

        assert_eq!(
            reply.packets,
            vec![
                Packet::new(77, PacketKind::Response, ""),
                Packet::new(77, PacketKind::Command, ""),
            ]
        );
        assert!(!reply.shutdown);
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let (mut session, _) = session();
        let reply = session
            .handle(Packet::new(77, PacketKind::Auth, "wrong"))
            .await;

        assert_eq!(
            reply.packets,
            vec![
                Packet::new(-1, PacketKind::Response, ""),
                Packet::new(-1, PacketKind::Command, ""),
            ]
        );
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_auth_retry_after_failure() {
        let (mut session, _) = session();
        session.handle(Packet::new(1, PacketKind::Auth, "nope")).await;
        let reply = session
            .handle(Packet::new(2, PacketKind::Auth, "secret"))
            .await;
        assert_eq!(reply.packets[0].request_id, 2);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_reauth_drops_authentication() {
        let (mut session, _) = session();
        login(&mut session).await;
        session.handle(Packet::new(3, PacketKind::Auth, "bad")).await;
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_password_is_exact() {
        let (mut session, _) = session();
        session.handle(Packet::new(1, PacketKind::Auth, " secret")).await;
        assert!(!session.is_authenticated());
        session.handle(Packet::new(1, PacketKind::Auth, "SECRET")).await;
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_command_before_auth() {
        let (mut session, executor) = session();
        let reply = session
            .handle(Packet::new(5, PacketKind::Command, "list"))
            .await;

        assert_eq!(reply.packets, vec![Packet::new(-1, PacketKind::Command, "")]);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_command_output() {
        let (mut session, executor) = session();
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(9, PacketKind::Command, "  list \n"))
            .await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            reply.packets,
            vec![
                Packet::response(9, ""),
                Packet::response(9, "There are 2 players online:\nAlice, Bob"),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_output_sends_single_empty_chunk() {
        let (mut session, _) = session();
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(4, PacketKind::Command, "silent"))
            .await;
        assert_eq!(
            reply.packets,
            vec![Packet::response(4, ""), Packet::response(4, "")]
        );
    }

    #[tokio::test]
    async fn test_large_output_is_chunked() {
        let (mut session, _) = session();
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(11, PacketKind::Command, "big"))
            .await;

        let sizes: Vec<usize> = reply.packets.iter().map(|p| p.body.len()).collect();
        assert_eq!(sizes, vec![0, 2048, 2048, 904]);
        assert!(reply
            .packets
            .iter()
            .all(|p| p.request_id == 11 && p.kind == PacketKind::Response));
    }

    #[tokio::test]
    async fn test_stop_command_any_case() {
        for command in ["stop", "STOP", " End ", "eNd"] {
            let (mut session, executor) = session();
            login(&mut session).await;

            let reply = session
                .handle(Packet::new(3, PacketKind::Command, command))
                .await;

            assert!(reply.shutdown, "{command} should stop");
            assert_eq!(bodies(&reply), vec!["", SHUTDOWN_MESSAGE]);
            assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_stop_requires_auth() {
        let (mut session, _) = session();
        let reply = session
            .handle(Packet::new(3, PacketKind::Command, "stop"))
            .await;
        assert!(!reply.shutdown);
    }

    #[tokio::test]
    async fn test_unknown_command_generic() {
        let (mut session, _) = session();
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(6, PacketKind::Command, "nosuch"))
            .await;
        assert_eq!(bodies(&reply), vec!["", GENERIC_FAILURE_MESSAGE]);
    }

    #[tokio::test]
    async fn test_unknown_command_detailed() {
        let (mut session, _) = session_with(RconConfig {
            password: "secret".to_string(),
            log_errors: true,
            ..Default::default()
        });
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(6, PacketKind::Command, "nosuch arg"))
            .await;
        assert_eq!(
            bodies(&reply),
            vec!["", "Error executing: nosuch arg (No such command)"]
        );
    }

    #[tokio::test]
    async fn test_executor_error_generic() {
        let (mut session, _) = session();
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(8, PacketKind::Command, "boom"))
            .await;
        assert_eq!(bodies(&reply), vec!["", GENERIC_FAILURE_MESSAGE]);
        assert!(!reply.packets[1].body.contains("exploded"));
    }

    #[tokio::test]
    async fn test_executor_error_detailed() {
        let (mut session, _) = session_with(RconConfig {
            password: "secret".to_string(),
            log_errors: true,
            ..Default::default()
        });
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(8, PacketKind::Command, "boom"))
            .await;
        assert_eq!(
            bodies(&reply),
            vec!["", "Error executing: boom (Unknown error)"]
        );
    }

    #[tokio::test]
    async fn test_colors_stripped_when_disabled() {
        let mut messages = crate::config::Messages::default();
        messages.error_executing = "§cError executing:".to_string();
        messages.unknown_request = "§4Unknown request".to_string();
        let (mut session, _) = session_with(RconConfig {
            password: "secret".to_string(),
            colored: false,
            log_errors: true,
            messages,
            ..Default::default()
        });
        login(&mut session).await;

        let failed = session
            .handle(Packet::new(1, PacketKind::Command, "nosuch"))
            .await;
        let unknown = session
            .handle(Packet::new(2, PacketKind::Unknown(9), ""))
            .await;

        for packet in failed.packets.iter().chain(unknown.packets.iter()) {
            assert!(!packet.body.contains('§'), "{:?}", packet.body);
        }
    }

    #[tokio::test]
    async fn test_colors_kept_when_enabled() {
        let mut messages = crate::config::Messages::default();
        messages.error_executing = "§cError executing:".to_string();
        let (mut session, _) = session_with(RconConfig {
            password: "secret".to_string(),
            log_errors: true,
            messages,
            ..Default::default()
        });
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(1, PacketKind::Command, "nosuch"))
            .await;
        assert!(reply.packets[1].body.starts_with("§c"));
    }

    #[tokio::test]
    async fn test_unknown_packet_type() {
        let (mut session, _) = session();
        let reply = session
            .handle(Packet::new(12, PacketKind::Unknown(0x1f), "whatever"))
            .await;
        assert_eq!(reply.packets, vec![Packet::response(12, "Unknown request 1f")]);

        let reply = session
            .handle(Packet::new(13, PacketKind::Unknown(-1), ""))
            .await;
        assert_eq!(reply.packets[0].body, "Unknown request ffffffff");
    }

    #[tokio::test]
    async fn test_client_response_packet_is_unknown() {
        let (mut session, _) = session();
        let reply = session.handle(Packet::response(1, "")).await;
        assert_eq!(reply.packets, vec![Packet::response(1, "Unknown request 0")]);
    }

    #[tokio::test]
    async fn test_debug_notifies_observers() {
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Arc::new(ScriptedExecutor::default());
        let host = Host::new(executor).with_notifier(notifier.clone());
        let config = RconConfig {
            password: "secret".to_string(),
            debug: true,
            ..Default::default()
        };
        let mut session = SessionHandler::new(Arc::new(config), host, peer());
        login(&mut session).await;

        let reply = session
            .handle(Packet::new(2, PacketKind::Command, "list"))
            .await;

        let notices = notifier.0.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, NOTIFY_PERMISSION);
        assert_eq!(
            notices[0].1,
            "Rcon connection from: [127.0.0.1:40000] Command: list"
        );
        // The notice never reaches the RCON client
        assert!(reply.packets.iter().all(|p| !p.body.contains("Rcon connection")));
    }

    #[tokio::test]
    async fn test_debug_notice_carries_raw_payload() {
        let notifier = Arc::new(RecordingNotifier::default());
        let host = Host::new(Arc::new(ScriptedExecutor::default())).with_notifier(notifier.clone());
        let config = RconConfig {
            password: "secret".to_string(),
            debug: true,
            ..Default::default()
        };
        let mut session = SessionHandler::new(Arc::new(config), host, peer());
        login(&mut session).await;

        session
            .handle(Packet::new(2, PacketKind::Command, "  list "))
            .await;

        let notices = notifier.0.lock().unwrap();
        assert_eq!(
            notices[0].1,
            "Rcon connection from: [127.0.0.1:40000] Command:   list "
        );
    }

    #[tokio::test]
    async fn test_no_notice_without_debug() {
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Arc::new(ScriptedExecutor::default());
        let host = Host::new(executor).with_notifier(notifier.clone());
        let config = RconConfig {
            password: "secret".to_string(),
            ..Default::default()
        };
        let mut session = SessionHandler::new(Arc::new(config), host, peer());
        login(&mut session).await;
        session
            .handle(Packet::new(2, PacketKind::Command, "list"))
            .await;

        assert!(notifier.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_chunk_packets_keep_order() {
        let message = format!("{}{}", "a".repeat(2048), "b".repeat(10));
        let packets: Vec<Packet> = chunk_packets(5, &message).collect();
        assert_eq!(packets.len(), 2);
        assert!(packets[0].body.chars().all(|c| c == 'a'));
        assert_eq!(packets[1].body, "b".repeat(10));
    }
}
