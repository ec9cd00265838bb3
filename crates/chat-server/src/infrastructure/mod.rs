//! Infrastructure layer for the chat server.
//!
//! Contains the OS-facing adapters: the TCP accept loop and per-client
//! sessions, TOML configuration storage, and the console UI bridge.

pub mod network;
pub mod storage;
pub mod ui_bridge;
