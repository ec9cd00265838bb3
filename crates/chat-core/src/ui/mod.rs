//! The boundary between the networking core and whatever renders it.
//!
//! Network tasks never touch UI state directly.  They report through a
//! [`UiSink`]; the production sink ([`ChannelUiSink`]) turns each call into a
//! [`UiEvent`] on an unbounded channel that a single UI-owning task drains.
//! In the other direction, the UI raises [`UiCommand`]s.
//!
//! ```text
//! session / read-loop tasks ──UiSink──► mpsc ──► UI task (owns the screen)
//! UI task ──UiCommand──► ChatServer / ClientLink
//! ```

pub mod mock;

use thiserror::Error;
use tokio::sync::mpsc;

/// Receiver of status lines and affordance changes.
///
/// Implementations must not block: callers include network tasks.
#[cfg_attr(test, mockall::automock)]
pub trait UiSink: Send + Sync {
    /// Appends a line to the message log.
    fn notify(&self, text: &str);

    /// A notice that deserves the user's attention (errors, server stopped).
    fn alert(&self, text: &str) {
        self.notify(text);
    }

    /// Client side: enables send/disconnect and disables connect when `true`.
    fn set_connected(&self, connected: bool);

    /// Server side: enables send/stop and disables start when `true`.
    fn set_listening(&self, listening: bool);
}

/// One UI update, as delivered to the UI-owning task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Log(String),
    Alert(String),
    Connected(bool),
    Listening(bool),
}

/// A [`UiSink`] that forwards every call over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelUiSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelUiSink {
    /// Creates the sink together with the receiver the UI task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: UiEvent) {
        // A closed receiver means the UI is gone; there is nobody left to tell.
        let _ = self.tx.send(event);
    }
}

impl UiSink for ChannelUiSink {
    fn notify(&self, text: &str) {
        self.emit(UiEvent::Log(text.to_string()));
    }

    fn alert(&self, text: &str) {
        self.emit(UiEvent::Alert(text.to_string()));
    }

    fn set_connected(&self, connected: bool) {
        self.emit(UiEvent::Connected(connected));
    }

    fn set_listening(&self, listening: bool) {
        self.emit(UiEvent::Listening(listening));
    }
}

// ── UI input ──────────────────────────────────────────────────────────────────

/// An intent raised by the user.
///
/// Address and port stay as typed; validation happens in the operation so
/// that errors are reported through the same sink as everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Start { address: String, port: String },
    Stop,
    Connect { address: String, port: String },
    Disconnect,
    Send(String),
    Quit,
}

/// A console line that looked like a command but was not one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl UiCommand {
    /// Parses one console line.
    ///
    /// Lines starting with `/` are commands; anything else is message text.
    /// `//text` sends `/text` literally.
    ///
    /// # Errors
    ///
    /// Returns [`CommandParseError`] for unknown commands or missing arguments.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(UiCommand::Send(line.to_string()));
        };
        if rest.starts_with('/') {
            return Ok(UiCommand::Send(rest.to_string()));
        }

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match name {
            "start" => endpoint_args(&args, "/start <ip> <port>")
                .map(|(address, port)| UiCommand::Start { address, port }),
            "connect" => endpoint_args(&args, "/connect <ip> <port>")
                .map(|(address, port)| UiCommand::Connect { address, port }),
            "stop" => Ok(UiCommand::Stop),
            "disconnect" => Ok(UiCommand::Disconnect),
            "quit" | "exit" => Ok(UiCommand::Quit),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

fn endpoint_args(
    args: &[&str],
    usage: &'static str,
) -> Result<(String, String), CommandParseError> {
    match args {
        [address, port] => Ok((address.to_string(), port.to_string())),
        _ => Err(CommandParseError::Usage(usage)),
    }
}
