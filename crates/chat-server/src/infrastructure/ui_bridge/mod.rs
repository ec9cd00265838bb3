//! Console front end for the server.
//!
//! Two halves, joined only by channels:
//!
//! ```text
//! stdin ──lines──► run_console ──UiCommand──► ChatServer
//! ChatServer / sessions ──UiSink──► mpsc ──► print_events ──► stdout
//! ```
//!
//! `print_events` is the only task that writes to the terminal, which keeps
//! lines from concurrent sessions from tearing.  Errors returned by server
//! operations are turned into alerts here, so every failure reaches the log.

use std::sync::Arc;

use chat_core::{UiCommand, UiEvent, UiSink};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ChatServer;

/// Whether the console loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Formats one UI event as a console line.
pub fn render(event: &UiEvent) -> String {
    match event {
        UiEvent::Log(text) => text.clone(),
        UiEvent::Alert(text) => format!("[!] {text}"),
        UiEvent::Listening(true) => "-- listening: type to send, /stop to stop --".to_string(),
        UiEvent::Listening(false) => "-- stopped: /start <ip> <port> to listen --".to_string(),
        UiEvent::Connected(_) => String::new(),
    }
}

/// Drains UI events to `out` until every sink is dropped.
///
/// # Errors
///
/// Returns the first write error on `out`.
pub async fn print_events<W>(
    mut events: mpsc::UnboundedReceiver<UiEvent>,
    mut out: W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        let line = render(&event);
        if line.is_empty() {
            continue;
        }
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    Ok(())
}

/// Carries out one user command against `server`.
pub async fn dispatch(server: &ChatServer, command: UiCommand, ui: &dyn UiSink) -> Flow {
    debug!(?command, "console command");
    let result = match command {
        UiCommand::Start { address, port } => server.start(&address, &port).await.map(|_| ()),
        UiCommand::Stop => {
            server.stop().await;
            Ok(())
        }
        UiCommand::Send(text) => server.send_to_all(&text).await.map(|_| ()),
        UiCommand::Connect { .. } | UiCommand::Disconnect => {
            ui.alert("That command is only available in the client.");
            Ok(())
        }
        UiCommand::Quit => return Flow::Quit,
    };

    if let Err(e) = result {
        ui.alert(&e.to_string());
    }
    Flow::Continue
}

/// Reads commands from `input` until `/quit` or end of input.
///
/// # Errors
///
/// Returns an error if reading `input` fails.
pub async fn run_console<R>(
    server: &ChatServer,
    ui: Arc<dyn UiSink>,
    input: R,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let command = match UiCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                ui.alert(&e.to_string());
                continue;
            }
        };
        if dispatch(server, command, ui.as_ref()).await == Flow::Quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerSettings;
    use chat_core::ui::mock::RecordingUiSink;
    use chat_core::{ChannelUiSink, Credentials};

    fn server_with(ui: Arc<dyn UiSink>) -> ChatServer {
        ChatServer::new(Credentials::new("console").unwrap(), ui, ServerSettings::default())
    }

    #[test]
    fn test_render_alert_is_marked() {
        assert_eq!(render(&UiEvent::Alert("boom".into())), "[!] boom");
        assert_eq!(render(&UiEvent::Log("plain".into())), "plain");
        assert!(render(&UiEvent::Connected(true)).is_empty());
    }

    #[tokio::test]
    async fn test_print_events_writes_lines_until_senders_drop() {
        // Arrange
        let (sink, rx) = ChannelUiSink::channel();
        sink.notify("Server started...");
        sink.set_connected(true);
        sink.alert("oops");
        drop(sink);
        let mut out = Vec::new();

        // Act
        print_events(rx, &mut out).await.unwrap();

        // Assert
        assert_eq!(String::from_utf8(out).unwrap(), "Server started...\n[!] oops\n");
    }

    #[tokio::test]
    async fn test_console_reports_errors_as_alerts() {
        // Arrange
        let ui = Arc::new(RecordingUiSink::new());
        let server = server_with(ui.clone());
        let input: &[u8] = b"/start 999.1.1.1 9999\nhello\n/dance\n/quit\n/stop\n";

        // Act
        run_console(&server, ui.clone(), input).await.unwrap();

        // Assert – three failures, and nothing after /quit ran
        let alerts = ui.alerts();
        assert_eq!(alerts.len(), 3);
        assert!(alerts[0].contains("not a valid IP address"));
        assert!(alerts[1].contains("not listening"));
        assert!(alerts[2].contains("unknown command"));
        assert!(!server.is_listening());
    }

    #[tokio::test]
    async fn test_dispatch_client_only_command_is_alerted() {
        let ui = Arc::new(RecordingUiSink::new());
        let server = server_with(ui.clone());

        let flow = dispatch(&server, UiCommand::Disconnect, ui.as_ref()).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(ui.alerts().len(), 1);
    }
}
