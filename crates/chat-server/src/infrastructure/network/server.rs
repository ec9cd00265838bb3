//! The chat server service driven by the UI.
//!
//! ```text
//! Stopped ──start(addr, port)──► Listening ──stop()──► Stopped
//!                                    │ ▲
//!                                    └─┘ accept: spawn ClientSession
//! ```
//!
//! # Stop sequence
//!
//! 1. Broadcast the shutdown sentinel to every registered client and wait
//!    for the writes to finish (best effort).
//! 2. Mark the server stopped, signal cancellation, and wait for the accept
//!    loop to drop the listening socket.
//! 3. Clear the registry and close every connection that was in it, outside
//!    the registry lock.
//!
//! Sessions that were still mid-handshake see the cancellation and never
//! register; a session that registers just after step 3 sees the flag and
//! removes itself.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_core::{
    parse_endpoint, require_message_text, ChatMessage, ControlSignal, Credentials,
    InputValidationError, UiSink,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::listener::ListenerLoop;
use super::SessionContext;
use crate::application::broadcast::{BroadcastReport, Broadcaster};
use crate::application::registry::ConnectionRegistry;

/// Errors returned by [`ChatServer`] operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already listening")]
    AlreadyListening,

    #[error("server is not listening")]
    NotListening,

    #[error(transparent)]
    Input(#[from] InputValidationError),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Fixed parameters of a server instance.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Upper bound on each client's handshake; `None` waits forever.
    pub handshake_timeout: Option<Duration>,
}

enum RunState {
    Stopped,
    Listening {
        shutdown: watch::Sender<bool>,
        accept_task: JoinHandle<()>,
    },
}

struct Inner {
    ui: Arc<dyn UiSink>,
    credentials: Arc<Credentials>,
    settings: ServerSettings,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    // Held across start/stop so the two never interleave.
    run: Mutex<RunState>,
    // Readable without waiting for an in-progress start/stop.
    local_addr: watch::Sender<Option<SocketAddr>>,
}

/// Multi-client chat server.  Cheap to clone; clones share one server.
#[derive(Clone)]
pub struct ChatServer {
    inner: Arc<Inner>,
}

impl ChatServer {
    pub fn new(credentials: Credentials, ui: Arc<dyn UiSink>, settings: ServerSettings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Arc::clone(&ui));
        let (local_addr, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                ui,
                credentials: Arc::new(credentials),
                settings,
                registry,
                broadcaster,
                run: Mutex::new(RunState::Stopped),
                local_addr,
            }),
        }
    }

    /// Validates the endpoint, binds it, and starts accepting clients.
    ///
    /// Port `0` is rejected by validation; tests bind an ephemeral port via
    /// [`ChatServer::start_on`].
    ///
    /// # Errors
    ///
    /// [`ServerError::Input`] for a malformed endpoint,
    /// [`ServerError::AlreadyListening`], or [`ServerError::Bind`].
    pub async fn start(&self, address: &str, port: &str) -> Result<SocketAddr, ServerError> {
        let addr = parse_endpoint(address, port)?;
        self.start_on(addr).await
    }

    /// Starts listening on an already-parsed address.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyListening`] or [`ServerError::Bind`].
    pub async fn start_on(&self, addr: SocketAddr) -> Result<SocketAddr, ServerError> {
        let inner = &self.inner;
        let mut run = inner.run.lock().await;
        if matches!(*run, RunState::Listening { .. }) {
            return Err(ServerError::AlreadyListening);
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let ctx = SessionContext {
            registry: Arc::clone(&inner.registry),
            broadcaster: inner.broadcaster.clone(),
            ui: Arc::clone(&inner.ui),
            credentials: Arc::clone(&inner.credentials),
            handshake_timeout: inner.settings.handshake_timeout,
            shutdown: shutdown_rx,
        };
        let accept_task = tokio::spawn(ListenerLoop::new(listener, ctx).run());

        *run = RunState::Listening {
            shutdown,
            accept_task,
        };
        inner.local_addr.send_replace(Some(local_addr));

        info!(%local_addr, "server listening");
        inner.ui.notify("Server started...");
        inner.ui.set_listening(true);
        Ok(local_addr)
    }

    /// Notifies clients, stops accepting, and closes every connection.
    /// Does nothing when already stopped.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let mut run = inner.run.lock().await;
        let RunState::Listening {
            shutdown,
            accept_task,
        } = std::mem::replace(&mut *run, RunState::Stopped)
        else {
            return;
        };
        info!("server stopping");

        let report = inner
            .broadcaster
            .broadcast(&ControlSignal::ServerStopping.to_wire())
            .await;
        info!(notified = report.delivered, "sent shutdown notice");
        inner.ui.notify("Notified clients that server is stopping.");

        inner.local_addr.send_replace(None);
        shutdown.send_replace(true);
        if let Err(e) = accept_task.await {
            warn!("accept loop ended abnormally: {e}");
        }

        let connections = inner.registry.clear();
        for conn in &connections {
            conn.close().await;
        }
        info!(closed = connections.len(), "server stopped");

        inner.ui.notify("Server stopped.");
        inner.ui.set_listening(false);
    }

    /// Sends `text` from the server to every connected client.
    ///
    /// # Errors
    ///
    /// [`ServerError::Input`] for empty text, or [`ServerError::NotListening`].
    pub async fn send_to_all(&self, text: &str) -> Result<BroadcastReport, ServerError> {
        let text = require_message_text(text)?;
        if !self.is_listening() {
            return Err(ServerError::NotListening);
        }

        let message = ChatMessage::from_server(text);
        let report = self.inner.broadcaster.broadcast(&message.to_wire()).await;
        self.inner.ui.notify(&format!("Sent: {message}"));
        Ok(report)
    }

    pub fn is_listening(&self) -> bool {
        self.inner.local_addr.borrow().is_some()
    }

    /// The bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.borrow()
    }

    /// Number of authenticated clients currently registered.
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::ui::mock::RecordingUiSink;
    use tokio_test::{assert_err, assert_ok};

    fn server() -> (ChatServer, Arc<RecordingUiSink>) {
        let ui = Arc::new(RecordingUiSink::new());
        let server = ChatServer::new(
            Credentials::new("unit").unwrap(),
            ui.clone(),
            ServerSettings::default(),
        );
        (server, ui)
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_start_reports_and_sets_listening() {
        // Arrange
        let (server, ui) = server();

        // Act
        let addr = assert_ok!(server.start_on(loopback()).await);

        // Assert
        assert!(server.is_listening());
        assert_eq!(server.local_addr(), Some(addr));
        assert_ne!(addr.port(), 0);
        assert!(ui.contains("Server started..."));
        assert_eq!(ui.last_listening(), Some(true));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (server, _) = server();
        assert_ok!(server.start_on(loopback()).await);

        let second = server.start_on(loopback()).await;

        assert!(matches!(second, Err(ServerError::AlreadyListening)));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_start_with_malformed_endpoint_changes_nothing() {
        let (server, ui) = server();

        let result = server.start("not-an-ip", "9999").await;

        assert!(matches!(
            result,
            Err(ServerError::Input(InputValidationError::InvalidAddress(_)))
        ));
        assert!(!server.is_listening());
        assert!(ui.events().is_empty());
    }

    #[tokio::test]
    async fn test_start_on_taken_port_is_bind_error() {
        let (first, _) = server();
        let (second, _) = server();
        let addr = assert_ok!(first.start_on(loopback()).await);

        let result = second.start_on(addr).await;

        assert!(matches!(result, Err(ServerError::Bind { .. })));
        assert!(!second.is_listening());
        first.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let (server, ui) = server();

        server.stop().await;

        assert!(ui.events().is_empty());
    }

    #[tokio::test]
    async fn test_stop_twice_reports_once() {
        // Arrange
        let (server, ui) = server();
        assert_ok!(server.start_on(loopback()).await);

        // Act
        server.stop().await;
        server.stop().await;

        // Assert
        let stopped = ui
            .lines()
            .iter()
            .filter(|l| *l == "Server stopped.")
            .count();
        assert_eq!(stopped, 1);
        assert!(!server.is_listening());
        assert_eq!(server.local_addr(), None);
        assert_eq!(ui.last_listening(), Some(false));
    }

    #[tokio::test]
    async fn test_stop_sequence_notices_in_order() {
        let (server, ui) = server();
        assert_ok!(server.start_on(loopback()).await);

        server.stop().await;

        let lines = ui.lines();
        let pos = |needle: &str| lines.iter().position(|l| l == needle).unwrap();
        assert!(pos("Notified clients that server is stopping.") < pos("Listener stopped."));
        assert!(pos("Listener stopped.") < pos("Server stopped."));
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (server, _) = server();
        assert_ok!(server.start_on(loopback()).await);
        server.stop().await;

        assert_ok!(server.start_on(loopback()).await);

        assert!(server.is_listening());
        server.stop().await;
    }

    #[tokio::test]
    async fn test_send_empty_text_is_rejected_locally() {
        let (server, _) = server();
        assert_ok!(server.start_on(loopback()).await);

        let result = server.send_to_all("").await;

        assert!(matches!(
            result,
            Err(ServerError::Input(InputValidationError::EmptyMessage))
        ));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_send_while_stopped_is_rejected() {
        let (server, _) = server();
        assert_err!(server.send_to_all("hi").await);
    }

    #[tokio::test]
    async fn test_send_with_no_clients_still_reports_sent() {
        let (server, ui) = server();
        assert_ok!(server.start_on(loopback()).await);

        let report = assert_ok!(server.send_to_all("hi").await);

        assert_eq!(report.delivered, 0);
        assert!(ui.contains("Sent: Server: hi"));
        server.stop().await;
    }
}
