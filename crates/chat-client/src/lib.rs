//! chat-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does chat-client do?
//!
//! The client holds one authenticated connection to a chat server:
//!
//! 1. Validates the typed address and port, connects over TCP, and proves
//!    knowledge of the shared secret.
//! 2. Runs a read loop that shows every inbound line and tears the link down
//!    when the server announces it is stopping.
//! 3. Sends typed lines to the server as `"Client: <text>"`.

/// Application layer: the client link use case.
pub mod application;

/// Infrastructure layer: TCP dialing, config storage, and the console bridge.
pub mod infrastructure;

pub use application::link::{ClientError, ClientLink, ClientSettings, Dialer, LinkStatus};
