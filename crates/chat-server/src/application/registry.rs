//! In-memory registry of authenticated client connections.
//!
//! The registry is shared by every session task, the broadcaster, and the
//! stop path.  All four operations take the same `std::sync::Mutex`, and none
//! of them await while holding it: callers that need to do I/O on the
//! members (broadcast, shutdown) take a copy with [`ConnectionRegistry::snapshot`]
//! or [`ConnectionRegistry::clear`] and work on that after the lock is gone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chat_core::{AuthenticatedConnection, ConnectionId};
use tracing::debug;

/// Thread-safe set of live, authenticated connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    members: Mutex<Vec<Arc<AuthenticatedConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn` unless a connection with the same id is already present.
    ///
    /// Returns `true` if the connection was added.
    pub fn add(&self, conn: Arc<AuthenticatedConnection>) -> bool {
        let mut members = self.lock();
        if members.iter().any(|m| m.id() == conn.id()) {
            return false;
        }
        debug!(conn = %conn.id(), total = members.len() + 1, "registered connection");
        members.push(conn);
        true
    }

    /// Removes the connection with `id`, returning it if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<AuthenticatedConnection>> {
        let mut members = self.lock();
        let index = members.iter().position(|m| m.id() == id)?;
        let removed = members.swap_remove(index);
        debug!(conn = %id, total = members.len(), "unregistered connection");
        Some(removed)
    }

    /// Point-in-time copy of the current members.
    pub fn snapshot(&self) -> Vec<Arc<AuthenticatedConnection>> {
        self.lock().clone()
    }

    /// Empties the registry and hands back everything that was in it, so the
    /// caller can close each connection without holding the lock.
    pub fn clear(&self) -> Vec<Arc<AuthenticatedConnection>> {
        std::mem::take(&mut *self.lock())
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().iter().any(|m| m.id() == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic elsewhere while holding the lock cannot leave the Vec in a
    // half-updated state, so the data is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<AuthenticatedConnection>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
