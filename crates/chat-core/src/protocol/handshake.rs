//! Handshake frames, their codec, and the pre-shared-secret proofs.
//!
//! Wire format of a handshake frame:
//! ```text
//! [payload_len:4][payload:N]
//! ```
//! `payload_len` is big-endian; `payload` is a bincode-encoded
//! [`HandshakeFrame`].  Frames longer than [`MAX_FRAME_LEN`] are rejected.
//!
//! # Exchange
//!
//! ```text
//! Client                                   Server
//! ──────                                   ──────
//! Hello { version, client_nonce }   ──►
//!                                   ◄──    Challenge { server_nonce, server_proof }
//! verify server_proof
//! Response { client_proof }         ──►
//!                                          verify client_proof
//!                                   ◄──    Accepted | Rejected { reason }
//! ```
//!
//! Both proofs are HMAC-SHA256 over a role label and the two nonces, keyed
//! with the shared secret.  Each side proves knowledge of the secret without
//! sending it, and fresh nonces keep a recorded exchange from being replayed.
//! After `Accepted`, the stream carries application bytes only.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Handshake protocol version.  Peers with a different version are rejected.
pub const HANDSHAKE_VERSION: u8 = 1;

/// Size of the length prefix in front of every handshake frame.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Largest accepted handshake frame payload.
pub const MAX_FRAME_LEN: usize = 1024;

pub const NONCE_LEN: usize = 16;
pub const PROOF_LEN: usize = 32;

pub type Nonce = [u8; NONCE_LEN];
pub type Proof = [u8; PROOF_LEN];

const SERVER_LABEL: &[u8] = b"server";
const CLIENT_LABEL: &[u8] = b"client";

/// One step of the authentication exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeFrame {
    Hello { version: u8, client_nonce: Nonce },
    Challenge { server_nonce: Nonce, server_proof: Proof },
    Response { client_proof: Proof },
    Accepted,
    Rejected { reason: RejectReason },
}

impl HandshakeFrame {
    /// Short name used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            HandshakeFrame::Hello { .. } => "Hello",
            HandshakeFrame::Challenge { .. } => "Challenge",
            HandshakeFrame::Response { .. } => "Response",
            HandshakeFrame::Accepted => "Accepted",
            HandshakeFrame::Rejected { .. } => "Rejected",
        }
    }
}

/// Why the server refused a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    VersionMismatch,
    BadCredentials,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::VersionMismatch => f.write_str("protocol version mismatch"),
            RejectReason::BadCredentials => f.write_str("bad credentials"),
        }
    }
}

/// Errors raised while authenticating a connection.
///
/// Every variant is fatal to the connection attempt; nothing is retried.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Transport failure (including EOF) before the handshake completed.
    #[error("transport failed during handshake: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("malformed handshake frame: {0}")]
    Malformed(String),

    /// The peer sent a valid frame at the wrong point in the exchange.
    #[error("unexpected handshake frame: expected {expected}, got {got}")]
    UnexpectedFrame {
        expected: &'static str,
        got: &'static str,
    },

    /// The server refused us.
    #[error("server rejected handshake: {0}")]
    Rejected(RejectReason),

    /// The server could not prove it knows the shared secret.
    #[error("server failed to prove knowledge of the shared secret")]
    ServerProofMismatch,

    /// The client could not prove it knows the shared secret.
    #[error("client failed to prove knowledge of the shared secret")]
    BadCredentials,

    /// The client speaks a different handshake version.
    #[error("unsupported handshake version {0}")]
    VersionMismatch(u8),

    /// An optional handshake timeout elapsed.
    #[error("handshake timed out")]
    TimedOut,
}

/// Errors raised when building [`Credentials`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("shared secret must not be empty")]
    Empty,
    #[error("shared secret cannot be used as an HMAC key")]
    InvalidKey,
}

/// The pre-shared secret, held as a ready-keyed HMAC.
///
/// The secret bytes themselves are not kept and never appear in `Debug`.
#[derive(Clone)]
pub struct Credentials {
    keyed: HmacSha256,
}

impl Credentials {
    /// Builds credentials from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Empty`] for an empty secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CredentialsError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CredentialsError::Empty);
        }
        let keyed =
            HmacSha256::new_from_slice(secret).map_err(|_| CredentialsError::InvalidKey)?;
        Ok(Self { keyed })
    }

    /// Proof sent by the server in its `Challenge`.
    pub fn server_proof(&self, client_nonce: &Nonce, server_nonce: &Nonce) -> Proof {
        finish(self.mac(SERVER_LABEL, client_nonce, server_nonce))
    }

    /// Proof sent by the client in its `Response`.
    pub fn client_proof(&self, server_nonce: &Nonce, client_nonce: &Nonce) -> Proof {
        finish(self.mac(CLIENT_LABEL, server_nonce, client_nonce))
    }

    /// Constant-time check of a server proof.
    pub fn verify_server_proof(
        &self,
        client_nonce: &Nonce,
        server_nonce: &Nonce,
        proof: &Proof,
    ) -> bool {
        self.mac(SERVER_LABEL, client_nonce, server_nonce)
            .verify_slice(proof)
            .is_ok()
    }

    /// Constant-time check of a client proof.
    pub fn verify_client_proof(
        &self,
        server_nonce: &Nonce,
        client_nonce: &Nonce,
        proof: &Proof,
    ) -> bool {
        self.mac(CLIENT_LABEL, server_nonce, client_nonce)
            .verify_slice(proof)
            .is_ok()
    }

    fn mac(&self, label: &[u8], first: &Nonce, second: &Nonce) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(label);
        mac.update(first);
        mac.update(second);
        mac
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

fn finish(mac: HmacSha256) -> Proof {
    let mut proof = [0u8; PROOF_LEN];
    proof.copy_from_slice(&mac.finalize().into_bytes());
    proof
}

/// Returns a fresh random nonce.
pub fn new_nonce() -> Nonce {
    Uuid::new_v4().into_bytes()
}

// ── Frame codec ───────────────────────────────────────────────────────────────

/// Encodes a frame with its length prefix.
///
/// # Errors
///
/// Returns [`HandshakeError::Malformed`] if serialization fails or the
/// payload exceeds [`MAX_FRAME_LEN`].
pub fn encode_frame(frame: &HandshakeFrame) -> Result<Vec<u8>, HandshakeError> {
    let payload =
        bincode::serialize(frame).map_err(|e| HandshakeError::Malformed(e.to_string()))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(HandshakeError::Malformed(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            payload.len()
        )));
    }

    let mut buf = Vec::with_capacity(LEN_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Validates a length prefix and returns the payload length it announces.
///
/// # Errors
///
/// Returns [`HandshakeError::Malformed`] for an empty or oversized frame.
pub fn decode_frame_len(prefix: [u8; LEN_PREFIX_SIZE]) -> Result<usize, HandshakeError> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(HandshakeError::Malformed(format!(
            "announced frame length {len} outside 1..={MAX_FRAME_LEN}"
        )));
    }
    Ok(len)
}

/// Decodes a frame payload (the bytes after the length prefix).
///
/// # Errors
///
/// Returns [`HandshakeError::Malformed`] if the payload is not a valid frame.
pub fn decode_frame_payload(payload: &[u8]) -> Result<HandshakeFrame, HandshakeError> {
    bincode::deserialize(payload).map_err(|e| HandshakeError::Malformed(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
