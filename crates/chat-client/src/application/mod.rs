//! Application layer use cases for the client.
//!
//! - **`link`** – [`link::ClientLink`]: connect, send, disconnect, and the
//!   background read loop.  Depends on the [`link::Dialer`] trait rather
//!   than on TCP directly, so tests can hand it in-memory connections.

pub mod link;
