//! Protocol module: chat payloads, the shutdown control signal, and the
//! authentication handshake codec.

pub mod handshake;
pub mod message;

pub use handshake::{
    Credentials, CredentialsError, HandshakeError, HandshakeFrame, RejectReason,
    HANDSHAKE_VERSION,
};
pub use message::{
    decode_chunk, ChatMessage, ControlSignal, Inbound, Sender, MAX_CHUNK_SIZE, SHUTDOWN_SENTINEL,
};
