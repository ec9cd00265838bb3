//! Infrastructure layer for the client application.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `chat_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
pub mod ui_bridge;
