//! The server's accept loop.
//!
//! Each accepted socket is handed to a freshly spawned [`ClientSession`] and
//! the loop goes straight back to `accept`, so one slow handshake never
//! holds up the next client.  There is no cap on concurrent sessions.
//!
//! Stopping is cooperative: the loop waits on the shutdown signal next to
//! `accept` and, once it fires, drops the listening socket and returns.  That
//! is the normal way for the loop to end and is not reported as an error.

use std::time::Duration;

use chat_core::PendingConnection;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::session::ClientSession;
use super::{stopping, SessionContext};

/// Pause after a failed `accept` (e.g. out of file descriptors) so the loop
/// does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct ListenerLoop {
    listener: TcpListener,
    ctx: SessionContext,
}

impl ListenerLoop {
    pub fn new(listener: TcpListener, ctx: SessionContext) -> Self {
        Self { listener, ctx }
    }

    /// Accepts until the server stops.
    pub async fn run(self) {
        let Self { listener, ctx } = self;
        let mut shutdown = ctx.shutdown.clone();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = stopping(&mut shutdown) => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "accepted connection");
                    ctx.ui.notify("Client connected...");
                    let session =
                        ClientSession::new(PendingConnection::from_tcp(stream), ctx.clone());
                    tokio::spawn(async move {
                        let outcome = session.run().await;
                        debug!(%peer, ?outcome, "session task finished");
                    });
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                    ctx.ui.alert(&format!("Accept failed: {e}"));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        drop(listener);
        info!("listener stopped");
        ctx.ui.notify("Listener stopped.");
    }
}
