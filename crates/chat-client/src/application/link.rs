//! ClientLink: the client's single connection to the chat server.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──handshake ok──► Active
//!      ▲                        │                          │
//!      └──── failure / abort ───┘                          │
//!      └──── EOF | sentinel | read error | disconnect ─────┘
//! ```
//!
//! # Generations
//!
//! Every connect attempt gets a fresh generation number.  The read loop and
//! the connect path only change state if the state still belongs to their
//! generation, so a read loop from an old connection that finishes late can
//! never tear down a newer one, and an attempt that was aborted by
//! `disconnect` can never install itself afterwards.
//!
//! # UI ordering
//!
//! State lives in a `std::sync::Mutex` that is never held across an
//! `.await`.  Affordance toggles are emitted while holding it (UI sinks do
//! not block), so the order of `set_connected` calls always matches the
//! order of state changes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chat_core::{
    parse_endpoint, require_message_text, AuthenticatedConnection, ChatMessage, Credentials,
    HandshakeError, Inbound, InputValidationError, PendingConnection, Role, TransportError,
    UiSink,
};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Opens the raw stream a [`ClientLink`] authenticates over.
///
/// The TCP implementation lives in the infrastructure layer; tests provide
/// in-memory ones.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, addr: SocketAddr) -> std::io::Result<PendingConnection>;
}

/// Error type for [`ClientLink`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("already connected or connecting")]
    AlreadyConnected,

    #[error("not connected to a server")]
    NotConnected,

    #[error("connection attempt was cancelled")]
    ConnectAborted,

    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication with server failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("send failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Input(#[from] InputValidationError),
}

/// Externally visible link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Active,
}

#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Upper bound on the handshake; `None` waits forever.
    pub handshake_timeout: Option<Duration>,
}

enum LinkState {
    Disconnected,
    Connecting {
        generation: u64,
        abort: Arc<Notify>,
    },
    Active {
        generation: u64,
        conn: Arc<AuthenticatedConnection>,
    },
}

impl LinkState {
    fn status(&self) -> LinkStatus {
        match self {
            LinkState::Disconnected => LinkStatus::Disconnected,
            LinkState::Connecting { .. } => LinkStatus::Connecting,
            LinkState::Active { .. } => LinkStatus::Active,
        }
    }
}

/// Why a read loop ended.
#[derive(Debug)]
enum Teardown {
    ServerStopped,
    PeerClosed,
    Failed(TransportError),
}

struct Inner {
    dialer: Arc<dyn Dialer>,
    credentials: Credentials,
    ui: Arc<dyn UiSink>,
    settings: ClientSettings,
    state: Mutex<LinkState>,
    next_generation: AtomicU64,
}

/// The client's connection to one server.  Cheap to clone; clones share one
/// link.
#[derive(Clone)]
pub struct ClientLink {
    inner: Arc<Inner>,
}

impl ClientLink {
    pub fn new(
        dialer: Arc<dyn Dialer>,
        credentials: Credentials,
        ui: Arc<dyn UiSink>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                dialer,
                credentials,
                ui,
                settings,
                state: Mutex::new(LinkState::Disconnected),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn state(&self) -> LinkStatus {
        self.lock().status()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkStatus::Active
    }

    /// Validates the endpoint, connects, authenticates, and starts the read
    /// loop.
    ///
    /// On any failure the link is left `Disconnected`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Input`] for a malformed endpoint (nothing is dialed),
    /// [`ClientError::AlreadyConnected`], [`ClientError::Connect`],
    /// [`ClientError::Handshake`], or [`ClientError::ConnectAborted`] if
    /// [`ClientLink::disconnect`] was called while connecting.
    pub async fn connect(&self, address: &str, port: &str) -> Result<(), ClientError> {
        let addr = parse_endpoint(address, port)?;
        self.connect_to(addr).await
    }

    /// [`ClientLink::connect`] for an already-parsed address.
    ///
    /// # Errors
    ///
    /// As [`ClientLink::connect`], minus input validation.
    pub async fn connect_to(&self, addr: SocketAddr) -> Result<(), ClientError> {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let abort = Arc::new(Notify::new());
        {
            let mut state = self.lock();
            if !matches!(*state, LinkState::Disconnected) {
                return Err(ClientError::AlreadyConnected);
            }
            *state = LinkState::Connecting {
                generation,
                abort: Arc::clone(&abort),
            };
        }
        info!(%addr, generation, "connecting");

        let established = tokio::select! {
            result = self.establish(addr) => result,
            _ = abort.notified() => Err(ClientError::ConnectAborted),
        };

        let conn = match established {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                warn!(%addr, "connect failed: {e}");
                let mut state = self.lock();
                if matches!(*state, LinkState::Connecting { generation: g, .. } if g == generation)
                {
                    *state = LinkState::Disconnected;
                }
                return Err(e);
            }
        };

        let installed = {
            let mut state = self.lock();
            if matches!(*state, LinkState::Connecting { generation: g, .. } if g == generation) {
                *state = LinkState::Active {
                    generation,
                    conn: Arc::clone(&conn),
                };
                self.inner.ui.set_connected(true);
                self.inner.ui.notify("Connected and authenticated with server!");
                true
            } else {
                false
            }
        };
        if !installed {
            debug!(generation, "connect attempt superseded");
            conn.close().await;
            return Err(ClientError::ConnectAborted);
        }

        info!(%addr, generation, conn = %conn.id(), "connected");
        tokio::spawn(read_loop(self.clone(), conn, generation));
        Ok(())
    }

    /// Sends `text` to the server as `"Client: <text>"`.
    ///
    /// A failed write is returned but does not change the link state; the
    /// read loop or an explicit disconnect takes care of that.
    ///
    /// # Errors
    ///
    /// [`ClientError::Input`] for empty text (nothing is written),
    /// [`ClientError::NotConnected`], or [`ClientError::Transport`].
    pub async fn send(&self, text: &str) -> Result<(), ClientError> {
        let text = require_message_text(text)?;
        let conn = match &*self.lock() {
            LinkState::Active { conn, .. } => Arc::clone(conn),
            _ => return Err(ClientError::NotConnected),
        };

        conn.write(&ChatMessage::from_client(text).to_wire()).await?;
        self.inner.ui.notify(&format!("Sent: {text}"));
        Ok(())
    }

    /// Drops the connection (or cancels the attempt in progress).
    /// Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let previous = {
            let mut state = self.lock();
            let previous = std::mem::replace(&mut *state, LinkState::Disconnected);
            match &previous {
                LinkState::Disconnected => return,
                LinkState::Connecting { abort, .. } => {
                    abort.notify_one();
                    self.inner.ui.set_connected(false);
                    self.inner.ui.notify("Connection attempt cancelled.");
                }
                LinkState::Active { .. } => {
                    self.inner.ui.set_connected(false);
                    self.inner.ui.notify("Disconnected from server.");
                }
            }
            previous
        };

        if let LinkState::Active { conn, generation } = previous {
            info!(generation, conn = %conn.id(), "disconnecting");
            conn.close().await;
        }
    }

    async fn establish(&self, addr: SocketAddr) -> Result<AuthenticatedConnection, ClientError> {
        let pending = self
            .inner
            .dialer
            .dial(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;
        let conn = pending
            .authenticate_within(
                Role::Client,
                &self.inner.credentials,
                self.inner.settings.handshake_timeout,
            )
            .await?;
        Ok(conn)
    }

    /// Ends the active connection of `generation`, if it is still current.
    async fn teardown(&self, generation: u64, reason: Teardown) {
        let ui = &self.inner.ui;
        let conn = {
            let mut state = self.lock();
            let current =
                matches!(*state, LinkState::Active { generation: g, .. } if g == generation);
            if !current {
                debug!(generation, ?reason, "read loop ended for a stale connection");
                return;
            }
            let LinkState::Active { conn, .. } =
                std::mem::replace(&mut *state, LinkState::Disconnected)
            else {
                return;
            };

            ui.set_connected(false);
            match &reason {
                Teardown::ServerStopped => {
                    ui.notify("Disconnected from server.");
                    ui.alert("Server has stopped. You have been disconnected.");
                }
                Teardown::PeerClosed => ui.notify("Connection closed."),
                Teardown::Failed(e) => ui.alert(&format!("Connection lost: {e}")),
            }
            conn
        };

        info!(generation, ?reason, "connection ended");
        conn.close().await;
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn read_loop(link: ClientLink, conn: Arc<AuthenticatedConnection>, generation: u64) {
    let reason = loop {
        match conn.read_chunk().await {
            Ok(Some(bytes)) => match Inbound::from_chunk(&bytes) {
                Inbound::Chat(text) => link.inner.ui.notify(&text),
                Inbound::ServerStopping { text } => {
                    link.inner.ui.notify(&text);
                    break Teardown::ServerStopped;
                }
            },
            Ok(None) => break Teardown::PeerClosed,
            // Closed locally: whoever closed it already updated the state.
            Err(TransportError::Closed) => {
                debug!(generation, "read loop stopped by local close");
                return;
            }
            Err(e) => break Teardown::Failed(e),
        }
    };
    link.teardown(generation, reason).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
