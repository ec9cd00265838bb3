//! Server-side handling of one client connection.
//!
//! ```text
//! Connecting ──► Authenticating ──► Active ──► Closing ──► Closed
//!                     │                                      ▲
//!                     └────────── handshake failed ──────────┘
//! ```
//!
//! While `Active` the session reads chunks, shows each one in the server
//! log, and relays it to every registered connection (the sender included).
//! The loop ends on end-of-stream, on a transport error, or when the server
//! starts stopping.  On the way out the session always unregisters and
//! closes its connection.
//!
//! Chunks are relayed as the raw bytes that were read; only the server log
//! line is decoded, so a character split across two reads reaches the other
//! clients intact.

use std::sync::Arc;

use chat_core::protocol::decode_chunk;
use chat_core::{AuthenticatedConnection, HandshakeError, PendingConnection, Role, TransportError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{stopping, SessionContext};

/// Lifecycle of one server-side session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The handshake failed; the connection was never registered.
    HandshakeFailed(HandshakeError),
    /// The peer closed the stream.
    PeerClosed,
    /// The server stopped, or another task closed the connection.
    Cancelled,
    /// Reading from the connection failed.
    TransportFailed(TransportError),
}

/// One accepted connection, from handshake to teardown.
pub struct ClientSession {
    pending: PendingConnection,
    ctx: SessionContext,
    state: watch::Sender<SessionState>,
}

impl ClientSession {
    pub fn new(pending: PendingConnection, ctx: SessionContext) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            pending,
            ctx,
            state,
        }
    }

    /// Follows the session's state while [`run`](Self::run) drives it.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Drives the session to completion.
    pub async fn run(self) -> SessionOutcome {
        let Self {
            pending,
            mut ctx,
            state,
        } = self;
        let id = pending.id();
        let peer = pending.peer().to_string();

        transition(&state, SessionState::Authenticating, &peer);
        let handshake = pending.authenticate_within(
            Role::Server,
            &ctx.credentials,
            ctx.handshake_timeout,
        );
        let conn = tokio::select! {
            result = handshake => match result {
                Ok(conn) => Arc::new(conn),
                Err(e) => {
                    warn!(conn = %id, %peer, "client handshake failed: {e}");
                    ctx.ui.notify(&format!("Client disconnected with error: {e}"));
                    ctx.ui.notify("Client disconnected.");
                    transition(&state, SessionState::Closed, &peer);
                    return SessionOutcome::HandshakeFailed(e);
                }
            },
            _ = stopping(&mut ctx.shutdown) => {
                debug!(conn = %id, %peer, "server stopped during handshake");
                transition(&state, SessionState::Closed, &peer);
                return SessionOutcome::Cancelled;
            }
        };

        ctx.registry.add(Arc::clone(&conn));
        // Stop may have cleared the registry between the handshake and the add.
        if ctx.is_shutting_down() {
            ctx.registry.remove(conn.id());
            conn.close().await;
            transition(&state, SessionState::Closed, &peer);
            return SessionOutcome::Cancelled;
        }

        info!(conn = %id, %peer, "client authenticated");
        ctx.ui.notify("Client authenticated.");
        transition(&state, SessionState::Active, &peer);

        let outcome = relay_loop(&conn, &mut ctx).await;

        transition(&state, SessionState::Closing, &peer);
        ctx.registry.remove(conn.id());
        conn.close().await;

        match &outcome {
            SessionOutcome::TransportFailed(e) => {
                warn!(conn = %id, %peer, "client read failed: {e}");
                ctx.ui.notify(&format!("Client disconnected with error: {e}"));
            }
            _ => {
                info!(conn = %id, %peer, ?outcome, "client disconnected");
            }
        }
        ctx.ui.notify("Client disconnected.");
        transition(&state, SessionState::Closed, &peer);
        outcome
    }
}

async fn relay_loop(conn: &AuthenticatedConnection, ctx: &mut SessionContext) -> SessionOutcome {
    loop {
        let read = tokio::select! {
            read = conn.read_chunk() => read,
            _ = stopping(&mut ctx.shutdown) => return SessionOutcome::Cancelled,
        };

        match read {
            Ok(Some(bytes)) => {
                ctx.ui.notify(&decode_chunk(&bytes));
                ctx.broadcaster.broadcast(&bytes).await;
            }
            Ok(None) => return SessionOutcome::PeerClosed,
            Err(TransportError::Closed) => return SessionOutcome::Cancelled,
            Err(e) => return SessionOutcome::TransportFailed(e),
        }
    }
}

fn transition(state: &watch::Sender<SessionState>, next: SessionState, peer: &str) {
    let from = state.send_replace(next);
    debug!(%peer, ?from, to = ?next, "session state");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
