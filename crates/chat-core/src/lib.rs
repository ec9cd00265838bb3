//! # chat-core
//!
//! Shared library for TCP chat containing the wire conventions, the
//! authenticated connection, input validation, and the contract between the
//! networking code and the UI.
//!
//! Both the server and the client applications depend on this crate.  It
//! owns no listeners and spawns no tasks.
//!
//! # Architecture overview
//!
//! A single server accepts many clients.  Every line a client sends is
//! relayed to all connected clients (including the sender); the server
//! operator can broadcast too.  Before any chat bytes flow, both ends prove
//! knowledge of a shared secret.
//!
//! - **`protocol`** – The bytes on the wire: length-prefixed handshake frames,
//!   then raw UTF-8 chat chunks tagged `"Server: "` / `"Client: "`, plus the
//!   in-band shutdown sentinel.
//!
//! - **`connection`** – [`PendingConnection`] (can only authenticate) and
//!   [`AuthenticatedConnection`] (can read, write, and close).
//!
//! - **`domain`** – Validation of user-typed endpoints and message text.
//!
//! - **`ui`** – The [`UiSink`] trait network tasks report through, and the
//!   [`UiCommand`]s the user raises.

pub mod connection;
pub mod domain;
pub mod protocol;
pub mod ui;

pub use connection::{
    AuthenticatedConnection, ConnectionId, ConnectionState, PendingConnection, Role,
    TransportError,
};
pub use domain::{parse_endpoint, require_message_text, InputValidationError};
pub use protocol::{
    ChatMessage, ControlSignal, Credentials, CredentialsError, HandshakeError, Inbound, Sender,
    MAX_CHUNK_SIZE, SHUTDOWN_SENTINEL,
};
pub use ui::{ChannelUiSink, UiCommand, UiEvent, UiSink};
