//! Chat payloads and the shutdown control signal.
//!
//! Wire format (application data, after the handshake):
//! ```text
//! [utf-8 text, no length prefix, no terminator]
//! ```
//! Each `read` on the connection yields at most [`MAX_CHUNK_SIZE`] bytes and
//! whatever the transport happened to deliver.  Message boundaries are
//! therefore *not* preserved: two quick sends may arrive as one chunk, and a
//! long message may be split across chunks.
//!
//! # Sender tags
//!
//! The sender of a chat line is identified only by a text prefix
//! (`"Server: "` or `"Client: "`).  [`ChatMessage`] keeps the sender as a
//! typed field and applies the prefix in exactly one place ([`ChatMessage::to_wire`]),
//! so the broadcast and registry code never has to know about it.
//!
//! # Shutdown sentinel
//!
//! When the server stops it sends the literal text in
//! [`ControlSignal::ServerStopping`].  Clients recognise it by substring match
//! via [`Inbound::classify`].  This is an in-band convention, not a framed
//! control message: an ordinary chat line that happens to contain the
//! sentinel text is indistinguishable from a real shutdown notice.

use std::fmt;

/// Maximum number of bytes returned by a single connection read.
pub const MAX_CHUNK_SIZE: usize = 512;

/// The literal text broadcast by the server right before it stops.
pub const SHUTDOWN_SENTINEL: &str = "Server is stopping. Disconnecting...";

/// Who produced a chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    /// The server operator, via the server's own send path.
    Server,
    /// A connected client.
    Client,
}

impl Sender {
    /// Returns the wire prefix for this sender.
    pub const fn tag(self) -> &'static str {
        match self {
            Sender::Server => "Server: ",
            Sender::Client => "Client: ",
        }
    }
}

/// An outbound chat line with an explicit sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    sender: Sender,
    body: String,
}

impl ChatMessage {
    /// Creates a message from `sender` with the given body text.
    pub fn new(sender: Sender, body: impl Into<String>) -> Self {
        Self {
            sender,
            body: body.into(),
        }
    }

    /// Shorthand for a server-originated message.
    pub fn from_server(body: impl Into<String>) -> Self {
        Self::new(Sender::Server, body)
    }

    /// Shorthand for a client-originated message.
    pub fn from_client(body: impl Into<String>) -> Self {
        Self::new(Sender::Client, body)
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Encodes the message as UTF-8 bytes: sender tag followed by the body.
    pub fn to_wire(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.sender.tag(), self.body)
    }
}

/// Out-of-band intents that travel in-band as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// The server is shutting down and will close every connection.
    ServerStopping,
}

impl ControlSignal {
    /// The exact text sent on the wire for this signal.
    pub const fn wire_text(self) -> &'static str {
        match self {
            ControlSignal::ServerStopping => SHUTDOWN_SENTINEL,
        }
    }

    pub fn to_wire(self) -> Vec<u8> {
        self.wire_text().as_bytes().to_vec()
    }
}

/// A decoded inbound chunk, split into ordinary chat text and control signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Plain chat text to display.
    Chat(String),
    /// The chunk carried the shutdown sentinel.  `text` is the full chunk,
    /// including anything before or after the sentinel.
    ServerStopping { text: String },
}

impl Inbound {
    /// Classifies decoded chunk text.
    ///
    /// A chunk containing the sentinel anywhere is treated as a shutdown
    /// notice regardless of surrounding content.  A sentinel split across two
    /// chunks is not detected.
    pub fn classify(text: String) -> Self {
        if text.contains(ControlSignal::ServerStopping.wire_text()) {
            Inbound::ServerStopping { text }
        } else {
            Inbound::Chat(text)
        }
    }

    /// Decodes raw chunk bytes (lossy UTF-8) and classifies them.
    pub fn from_chunk(bytes: &[u8]) -> Self {
        Self::classify(decode_chunk(bytes))
    }

    /// The chunk text, whatever its classification.
    pub fn text(&self) -> &str {
        match self {
            Inbound::Chat(text) | Inbound::ServerStopping { text } => text,
        }
    }
}

/// Decodes a chunk as UTF-8, replacing invalid sequences with U+FFFD.
///
/// A multi-byte character split across two chunks decodes as replacement
/// characters on both sides of the split.
pub fn decode_chunk(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
