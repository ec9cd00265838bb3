//! Authenticated duplex connections.
//!
//! A freshly accepted or connected stream is a [`PendingConnection`].  It
//! exposes no way to read or write application data; the only thing it can
//! do is [`PendingConnection::authenticate`], which runs the handshake from
//! [`crate::protocol::handshake`] and, on success, yields an
//! [`AuthenticatedConnection`].
//!
//! ```text
//! PendingConnection ──authenticate──► AuthenticatedConnection ──close──► (closed)
//!   Unauthenticated                       Authenticated                   Closed
//! ```
//!
//! # Concurrency
//!
//! An `AuthenticatedConnection` is shared behind an `Arc` between the task
//! that reads from it (a server session or the client read loop) and any task
//! that writes to it (the broadcaster or the client send path).  Reads and
//! writes lock separate halves, so a read blocked waiting for the peer never
//! delays a write.  [`AuthenticatedConnection::close`] flips a `watch` flag
//! that every pending read and write also waits on, so close never waits for
//! network activity.

pub mod loopback;

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::{watch, Mutex},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::handshake::{
    decode_frame_len, decode_frame_payload, encode_frame, new_nonce, Credentials,
    HandshakeError, HandshakeFrame, RejectReason, HANDSHAKE_VERSION, LEN_PREFIX_SIZE,
};
use crate::protocol::message::MAX_CHUNK_SIZE;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Unique identity of one connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first 8 hex digits are plenty to tell connections apart in logs.
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Which side of the handshake this end plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// Errors on an authenticated connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection was closed locally.
    #[error("connection is closed")]
    Closed,
    /// The underlying stream failed.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ── PendingConnection ─────────────────────────────────────────────────────────

/// A raw stream that has not completed the handshake yet.
pub struct PendingConnection {
    id: ConnectionId,
    peer: String,
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl PendingConnection {
    /// Wraps any duplex byte stream.  `peer` is used in logs only.
    pub fn new<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            id: ConnectionId::new(),
            peer: peer.into(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Wraps a TCP stream, labelling it with the peer address.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());
        let (reader, writer) = stream.into_split();
        Self {
            id: ConnectionId::new(),
            peer,
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::Unauthenticated
    }

    /// Runs the handshake with no time limit.
    ///
    /// On failure the stream is dropped (and therefore closed).
    ///
    /// # Errors
    ///
    /// Returns the [`HandshakeError`] that ended the exchange.
    pub async fn authenticate(
        self,
        role: Role,
        credentials: &Credentials,
    ) -> Result<AuthenticatedConnection, HandshakeError> {
        self.authenticate_within(role, credentials, None).await
    }

    /// Runs the handshake, optionally bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::TimedOut`] if `limit` elapses first, or the
    /// error that ended the exchange.
    pub async fn authenticate_within(
        mut self,
        role: Role,
        credentials: &Credentials,
        limit: Option<Duration>,
    ) -> Result<AuthenticatedConnection, HandshakeError> {
        debug!(conn = %self.id, peer = %self.peer, ?role, "handshake started");

        let exchange = async {
            match role {
                Role::Server => {
                    server_handshake(&mut self.reader, &mut self.writer, credentials).await
                }
                Role::Client => {
                    client_handshake(&mut self.reader, &mut self.writer, credentials).await
                }
            }
        };

        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => Err(HandshakeError::TimedOut),
            },
            None => exchange.await,
        };

        match result {
            Ok(()) => {
                debug!(conn = %self.id, peer = %self.peer, "handshake succeeded");
                Ok(AuthenticatedConnection::new(self, role))
            }
            Err(e) => {
                warn!(conn = %self.id, peer = %self.peer, "handshake failed: {e}");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for PendingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

// ── AuthenticatedConnection ───────────────────────────────────────────────────

/// A connection that completed the handshake.
///
/// Closing is idempotent and may be called from any task at any time.
pub struct AuthenticatedConnection {
    id: ConnectionId,
    peer: String,
    role: Role,
    reader: Mutex<Option<BoxedReader>>,
    writer: Mutex<Option<BoxedWriter>>,
    closed: watch::Sender<bool>,
}

impl AuthenticatedConnection {
    fn new(pending: PendingConnection, role: Role) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: pending.id,
            peer: pending.peer,
            role,
            reader: Mutex::new(Some(pending.reader)),
            writer: Mutex::new(Some(pending.writer)),
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Authenticated
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// `true` until the connection is closed locally.
    pub fn is_writable(&self) -> bool {
        !self.is_closed()
    }

    /// Reads up to [`MAX_CHUNK_SIZE`] bytes.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the connection is (or becomes,
    /// while waiting) closed locally, or [`TransportError::Io`] on failure.
    pub async fn read_chunk(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Err(TransportError::Closed);
        };

        let mut buf = [0u8; MAX_CHUNK_SIZE];
        let outcome = tokio::select! {
            result = reader.read(&mut buf) => Some(result),
            _ = closed_signal(&mut closed) => None,
        };

        match outcome {
            Some(Ok(0)) => Ok(None),
            Some(Ok(n)) => Ok(Some(buf[..n].to_vec())),
            Some(Err(e)) => Err(TransportError::Io(e)),
            None => {
                guard.take();
                Err(TransportError::Closed)
            }
        }
    }

    /// Writes all of `bytes` and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the connection is closed locally,
    /// or [`TransportError::Io`] if the stream fails (e.g. the peer is gone).
    pub async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(TransportError::Closed);
        };

        let outcome = tokio::select! {
            result = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            } => Some(result),
            _ = closed_signal(&mut closed) => None,
        };

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(TransportError::Io(e)),
            None => Err(TransportError::Closed),
        }
    }

    /// Closes the connection.  Calling it again is a no-op.
    ///
    /// Pending reads and writes on other tasks return
    /// [`TransportError::Closed`]; the peer observes end-of-stream.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        debug!(conn = %self.id, peer = %self.peer, "closing connection");

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(conn = %self.id, "shutdown after close failed: {e}");
            }
        }
        // A read loop holding the reader drops it itself once it sees the flag.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }
}

impl fmt::Debug for AuthenticatedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("role", &self.role)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Resolves once the close flag is set.
async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    // The sender lives as long as the connection, so this only errors if the
    // connection itself is gone.
    let _ = closed.wait_for(|c| *c).await;
}

// ── Handshake drivers ─────────────────────────────────────────────────────────

async fn server_handshake(
    reader: &mut BoxedReader,
    writer: &mut BoxedWriter,
    credentials: &Credentials,
) -> Result<(), HandshakeError> {
    let client_nonce = match read_frame(reader).await? {
        HandshakeFrame::Hello {
            version,
            client_nonce,
        } => {
            if version != HANDSHAKE_VERSION {
                let reject = HandshakeFrame::Rejected {
                    reason: RejectReason::VersionMismatch,
                };
                // Best effort; the attempt fails either way.
                let _ = write_frame(writer, &reject).await;
                return Err(HandshakeError::VersionMismatch(version));
            }
            client_nonce
        }
        other => return Err(unexpected("Hello", &other)),
    };

    let server_nonce = new_nonce();
    let challenge = HandshakeFrame::Challenge {
        server_nonce,
        server_proof: credentials.server_proof(&client_nonce, &server_nonce),
    };
    write_frame(writer, &challenge).await?;

    let client_proof = match read_frame(reader).await? {
        HandshakeFrame::Response { client_proof } => client_proof,
        other => return Err(unexpected("Response", &other)),
    };

    if !credentials.verify_client_proof(&server_nonce, &client_nonce, &client_proof) {
        let reject = HandshakeFrame::Rejected {
            reason: RejectReason::BadCredentials,
        };
        let _ = write_frame(writer, &reject).await;
        return Err(HandshakeError::BadCredentials);
    }

    write_frame(writer, &HandshakeFrame::Accepted).await
}

async fn client_handshake(
    reader: &mut BoxedReader,
    writer: &mut BoxedWriter,
    credentials: &Credentials,
) -> Result<(), HandshakeError> {
    let client_nonce = new_nonce();
    let hello = HandshakeFrame::Hello {
        version: HANDSHAKE_VERSION,
        client_nonce,
    };
    write_frame(writer, &hello).await?;

    let server_nonce = match read_frame(reader).await? {
        HandshakeFrame::Challenge {
            server_nonce,
            server_proof,
        } => {
            if !credentials.verify_server_proof(&client_nonce, &server_nonce, &server_proof) {
                return Err(HandshakeError::ServerProofMismatch);
            }
            server_nonce
        }
        HandshakeFrame::Rejected { reason } => return Err(HandshakeError::Rejected(reason)),
        other => return Err(unexpected("Challenge", &other)),
    };

    let response = HandshakeFrame::Response {
        client_proof: credentials.client_proof(&server_nonce, &client_nonce),
    };
    write_frame(writer, &response).await?;

    match read_frame(reader).await? {
        HandshakeFrame::Accepted => Ok(()),
        HandshakeFrame::Rejected { reason } => Err(HandshakeError::Rejected(reason)),
        other => Err(unexpected("Accepted", &other)),
    }
}

fn unexpected(expected: &'static str, got: &HandshakeFrame) -> HandshakeError {
    HandshakeError::UnexpectedFrame {
        expected,
        got: got.kind(),
    }
}

/// Reads exactly one frame; never consumes bytes past it.
async fn read_frame(reader: &mut BoxedReader) -> Result<HandshakeFrame, HandshakeError> {
    let mut prefix = [0u8; LEN_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await?;
    let len = decode_frame_len(prefix)?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_frame_payload(&payload)
}

async fn write_frame(
    writer: &mut BoxedWriter,
    frame: &HandshakeFrame,
) -> Result<(), HandshakeError> {
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
