//! Application layer for the chat server.
//!
//! Nothing here opens sockets or spawns tasks; both types operate on
//! connections handed to them by the network layer.
//!
//! # Sub-modules
//!
//! - **`registry`** – The shared set of authenticated connections.  The only
//!   state shared between sessions; every access goes through one lock.
//!
//! - **`broadcast`** – Fan-out of one payload to a registry snapshot, with
//!   per-connection failure isolation.

pub mod broadcast;
pub mod registry;
