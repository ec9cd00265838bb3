//! In-memory connection pairs for tests and benchmarks.
//!
//! Lets callers exercise real handshakes and real reads/writes without
//! opening sockets, in the same spirit as the mock adapters shipped by the
//! server and client crates.

use super::{AuthenticatedConnection, PendingConnection, Role};
use crate::protocol::handshake::{Credentials, HandshakeError};

/// Buffer size of each direction of the in-memory pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Returns two unauthenticated ends of an in-memory pipe: `(client, server)`.
pub fn pending_pair() -> (PendingConnection, PendingConnection) {
    let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
    (
        PendingConnection::new(client, "loopback-client"),
        PendingConnection::new(server, "loopback-server"),
    )
}

/// Runs both sides of the handshake and returns `(client, server)`.
///
/// # Errors
///
/// Returns the first side's [`HandshakeError`] if either side fails.
pub async fn authenticated_pair(
    credentials: &Credentials,
) -> Result<(AuthenticatedConnection, AuthenticatedConnection), HandshakeError> {
    let (client, server) = pending_pair();
    let (client, server) = tokio::join!(
        client.authenticate(Role::Client, credentials),
        server.authenticate(Role::Server, credentials)
    );
    Ok((client?, server?))
}
