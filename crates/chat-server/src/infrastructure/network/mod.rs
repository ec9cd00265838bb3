//! Network infrastructure for the chat server.
//!
//! # Sub-modules
//!
//! - **`listener`** – The accept loop.  Spawns one session task per accepted
//!   socket and ends quietly when the server stops.
//!
//! - **`session`** – One client's lifecycle: handshake, registration, the
//!   read-and-relay loop, and teardown.
//!
//! - **`server`** – The [`server::ChatServer`] service tying the two
//!   together with the registry and the broadcaster.

pub mod listener;
pub mod server;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use chat_core::{Credentials, UiSink};
use tokio::sync::watch;

use crate::application::broadcast::Broadcaster;
use crate::application::registry::ConnectionRegistry;

/// Everything a session needs, shared by all sessions of one listening run.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Broadcaster,
    pub ui: Arc<dyn UiSink>,
    pub credentials: Arc<Credentials>,
    pub handshake_timeout: Option<Duration>,
    pub shutdown: watch::Receiver<bool>,
}

impl SessionContext {
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Resolves once the server begins stopping (or the stop handle is gone).
pub(crate) async fn stopping(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}
