//! Console front end for the client.
//!
//! Mirrors the server console: stdin lines become [`UiCommand`]s applied to
//! the [`ClientLink`], and a single printer task renders [`UiEvent`]s.
//! Errors from link operations are shown as alerts; everything the read loop
//! reports arrives through the sink on its own.

use std::sync::Arc;

use chat_core::{UiCommand, UiEvent, UiSink};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ClientLink;

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
        UiEvent::Connected(true) => {
            "-- connected: type to send, /disconnect to leave --".to_string()
        }
        UiEvent::Connected(false) => "-- disconnected: /connect <ip> <port> --".to_string(),
        UiEvent::Listening(_) => String::new(),
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

/// Carries out one user command against `link`.
pub async fn dispatch(link: &ClientLink, command: UiCommand, ui: &dyn UiSink) -> Flow {
    debug!(?command, "console command");
    let result = match command {
        UiCommand::Connect { address, port } => link.connect(&address, &port).await,
        UiCommand::Disconnect => {
            link.disconnect().await;
            Ok(())
        }
        UiCommand::Send(text) => link.send(&text).await,
        UiCommand::Start { .. } | UiCommand::Stop => {
            ui.alert("That command is only available in the server.");
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
/// `/connect` runs in the background so that `/disconnect` typed while a
/// connection attempt hangs can still cancel it.
///
/// # Errors
///
/// Returns an error if reading `input` fails.
pub async fn run_console<R>(link: &ClientLink, ui: Arc<dyn UiSink>, input: R) -> std::io::Result<()>
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

        if matches!(command, UiCommand::Connect { .. }) {
            let (link, ui) = (link.clone(), Arc::clone(&ui));
            tokio::spawn(async move {
                dispatch(&link, command, ui.as_ref()).await;
            });
            continue;
        }
        if dispatch(link, command, ui.as_ref()).await == Flow::Quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::TcpDialer;
    use crate::ClientSettings;
    use chat_core::ui::mock::RecordingUiSink;
    use chat_core::Credentials;

    fn offline_link(ui: Arc<dyn UiSink>) -> ClientLink {
        ClientLink::new(
            Arc::new(TcpDialer::default()),
            Credentials::new("console").unwrap(),
            ui,
            ClientSettings::default(),
        )
    }

    #[test]
    fn test_render_connected_toggle() {
        assert!(render(&UiEvent::Connected(true)).contains("connected"));
        assert!(render(&UiEvent::Listening(true)).is_empty());
        assert_eq!(render(&UiEvent::Alert("x".into())), "[!] x");
    }

    #[tokio::test]
    async fn test_console_alerts_on_local_errors() {
        // Arrange
        let ui = Arc::new(RecordingUiSink::new());
        let link = offline_link(ui.clone());
        let input: &[u8] = b"hello\n\n/stop\n/quit\n";

        // Act
        run_console(&link, ui.clone(), input).await.unwrap();

        // Assert
        let alerts = ui.alerts();
        assert_eq!(alerts.len(), 3);
        assert!(alerts[0].contains("not connected"));
        assert!(alerts[1].contains("please enter a message"));
        assert!(alerts[2].contains("only available in the server"));
    }

    #[tokio::test]
    async fn test_dispatch_disconnect_when_idle_is_silent() {
        let ui = Arc::new(RecordingUiSink::new());
        let link = offline_link(ui.clone());

        let flow = dispatch(&link, UiCommand::Disconnect, ui.as_ref()).await;

        assert_eq!(flow, Flow::Continue);
        assert!(ui.events().is_empty());
    }
}
