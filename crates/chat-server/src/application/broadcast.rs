//! Best-effort fan-out of one payload to every registered connection.
//!
//! Delivery is at-most-once per recipient with no retry.  Within one
//! [`Broadcaster::broadcast`] call the recipients are written one after the
//! other, so a given recipient sees payloads from one caller in order; two
//! broadcasts racing from different sessions may interleave differently at
//! different recipients.

use std::sync::Arc;

use chat_core::{ConnectionId, TransportError, UiSink};
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;

/// What happened to one broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Connections the payload was written to.
    pub delivered: usize,
    /// Connections skipped because they were already closed.
    pub skipped: usize,
    /// Connections whose write failed, with the error.
    pub failed: Vec<(ConnectionId, TransportError)>,
}

impl BroadcastReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends payloads to a registry snapshot.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    ui: Arc<dyn UiSink>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, ui: Arc<dyn UiSink>) -> Self {
        Self { registry, ui }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Writes `payload` to every connection in a fresh snapshot.
    ///
    /// A failed write is logged, reported to the UI, and the failing
    /// connection is closed so its session unwinds; the remaining recipients
    /// still get the payload.
    pub async fn broadcast(&self, payload: &[u8]) -> BroadcastReport {
        let recipients = self.registry.snapshot();
        let mut report = BroadcastReport::default();

        for conn in recipients {
            if !conn.is_writable() {
                report.skipped += 1;
                continue;
            }
            match conn.write(payload).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(conn = %conn.id(), peer = conn.peer(), "broadcast write failed: {e}");
                    self.ui.notify(&format!("Failed to send to {}: {e}", conn.peer()));
                    conn.close().await;
                    report.failed.push((conn.id(), e));
                }
            }
        }

        debug!(
            bytes = payload.len(),
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed.len(),
            "broadcast finished"
        );
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
