//! Integration tests for the chat server over loopback TCP.
//!
//! # Purpose
//!
//! These tests drive [`ChatServer`] through its public API the way the
//! console does, with real clients built from `chat_core` connections on the
//! other end of real sockets.  They verify:
//!
//! - The relay scenario: a line from one client reaches every client
//!   (sender included), and server-originated lines reach everyone too.
//! - The stop sequence: every client receives the shutdown sentinel, then
//!   end-of-stream, and the registry ends up empty.
//! - Registry bookkeeping under concurrent connects and disconnects.
//! - UI affordance toggles, checked with a `mockall` sink.
//!
//! The server binds `127.0.0.1:0`, so tests never collide on a port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_core::ui::mock::RecordingUiSink;
use chat_core::{
    AuthenticatedConnection, ChatMessage, Credentials, Inbound, PendingConnection, Role, UiSink,
};
use chat_server::{ChatServer, ServerSettings};
use mockall::{mock, Sequence};
use tokio::net::TcpStream;

const SECRET: &str = "integration-secret";

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn new_server() -> (ChatServer, Arc<RecordingUiSink>) {
    let ui = Arc::new(RecordingUiSink::new());
    let server = ChatServer::new(
        Credentials::new(SECRET).unwrap(),
        ui.clone(),
        ServerSettings::default(),
    );
    (server, ui)
}

async fn connect_client(addr: SocketAddr) -> AuthenticatedConnection {
    let stream = TcpStream::connect(addr).await.expect("connect");
    PendingConnection::from_tcp(stream)
        .authenticate(Role::Client, &Credentials::new(SECRET).unwrap())
        .await
        .expect("handshake")
}

/// Polls `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

async fn read_text(conn: &AuthenticatedConnection) -> Inbound {
    let chunk = tokio::time::timeout(Duration::from_secs(2), conn.read_chunk())
        .await
        .expect("read timed out")
        .expect("read failed")
        .expect("unexpected end of stream");
    Inbound::from_chunk(&chunk)
}

// ── Relay scenario ────────────────────────────────────────────────────────────

/// Two clients A and B; A says "hello", the server says "hi".
#[tokio::test]
async fn test_two_clients_see_each_other_and_the_server() {
    // Arrange
    let (server, ui) = new_server();
    let addr = server.start_on(loopback()).await.unwrap();
    let a = connect_client(addr).await;
    let b = connect_client(addr).await;
    eventually(|| server.connection_count() == 2).await;

    // Act: A sends
    a.write(&ChatMessage::from_client("hello").to_wire())
        .await
        .unwrap();

    // Assert: both clients and the server log see it
    assert_eq!(read_text(&a).await, Inbound::Chat("Client: hello".into()));
    assert_eq!(read_text(&b).await, Inbound::Chat("Client: hello".into()));
    assert!(ui.lines().contains(&"Client: hello".to_string()));

    // Act: the server sends
    let report = server.send_to_all("hi").await.unwrap();

    // Assert
    assert_eq!(report.delivered, 2);
    assert_eq!(read_text(&a).await, Inbound::Chat("Server: hi".into()));
    assert_eq!(read_text(&b).await, Inbound::Chat("Server: hi".into()));
    assert!(ui.contains("Sent: Server: hi"));

    server.stop().await;
}

// ── Stop sequence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_sends_sentinel_then_closes_every_client() {
    // Arrange
    let (server, ui) = new_server();
    let addr = server.start_on(loopback()).await.unwrap();
    let a = connect_client(addr).await;
    let b = connect_client(addr).await;
    eventually(|| server.connection_count() == 2).await;

    // Act
    server.stop().await;

    // Assert
    for client in [&a, &b] {
        assert!(matches!(
            read_text(client).await,
            Inbound::ServerStopping { .. }
        ));
        let eof = tokio::time::timeout(Duration::from_secs(2), client.read_chunk())
            .await
            .unwrap()
            .unwrap();
        assert!(eof.is_none());
    }
    assert_eq!(server.connection_count(), 0);
    assert!(!server.is_listening());
    assert!(ui.contains("Notified clients that server is stopping."));
    assert!(ui.contains("Server stopped."));
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_stop_then_stop_again_is_harmless() {
    let (server, _ui) = new_server();
    let addr = server.start_on(loopback()).await.unwrap();
    let _a = connect_client(addr).await;
    eventually(|| server.connection_count() == 1).await;

    server.stop().await;
    server.stop().await;

    assert_eq!(server.connection_count(), 0);
    assert!(!server.is_listening());
}

// ── Registry bookkeeping ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_registry_tracks_concurrent_connects_and_disconnects() {
    // Arrange
    let (server, ui) = new_server();
    let addr = server.start_on(loopback()).await.unwrap();

    // Act: five clients connect concurrently
    let mut handles = Vec::new();
    for _ in 0..5 {
        handles.push(tokio::spawn(connect_client(addr)));
    }
    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap());
    }
    eventually(|| server.connection_count() == 5).await;

    // Act: two of them leave
    for client in clients.drain(..2) {
        client.close().await;
    }

    // Assert
    eventually(|| server.connection_count() == 3).await;
    eventually(|| {
        ui.lines()
            .iter()
            .filter(|l| *l == "Client disconnected.")
            .count()
            == 2
    })
    .await;

    server.stop().await;
}

#[tokio::test]
async fn test_vanished_client_does_not_block_the_others() {
    // Arrange
    let (server, _ui) = new_server();
    let addr = server.start_on(loopback()).await.unwrap();
    let a = connect_client(addr).await;
    let b = connect_client(addr).await;
    let c = connect_client(addr).await;
    eventually(|| server.connection_count() == 3).await;

    // Act
    drop(b);
    server.send_to_all("anyone there?").await.unwrap();

    // Assert
    assert_eq!(read_text(&a).await.text(), "Server: anyone there?");
    assert_eq!(read_text(&c).await.text(), "Server: anyone there?");
    eventually(|| server.connection_count() == 2).await;

    server.stop().await;
}

#[tokio::test]
async fn test_client_with_wrong_secret_is_never_registered() {
    let (server, ui) = new_server();
    let addr = server.start_on(loopback()).await.unwrap();

    let stream = TcpStream::connect(addr).await.unwrap();
    let result = PendingConnection::from_tcp(stream)
        .authenticate(Role::Client, &Credentials::new("wrong").unwrap())
        .await;

    assert!(result.is_err());
    eventually(|| ui.contains("Client disconnected with error")).await;
    assert_eq!(server.connection_count(), 0);
    server.stop().await;
}

// ── UI affordances ────────────────────────────────────────────────────────────

mock! {
    pub Ui {}

    impl UiSink for Ui {
        fn notify(&self, text: &str);
        fn alert(&self, text: &str);
        fn set_connected(&self, connected: bool);
        fn set_listening(&self, listening: bool);
    }
}

#[tokio::test]
async fn test_listening_affordance_toggles_on_start_and_stop() {
    // Arrange
    let mut ui = MockUi::new();
    let mut seq = Sequence::new();
    ui.expect_notify().return_const(());
    ui.expect_alert().never();
    ui.expect_set_connected().never();
    ui.expect_set_listening()
        .withf(|listening| *listening)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    ui.expect_set_listening()
        .withf(|listening| !*listening)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    let server = ChatServer::new(
        Credentials::new(SECRET).unwrap(),
        Arc::new(ui),
        ServerSettings::default(),
    );

    // Act
    server.start_on(loopback()).await.unwrap();
    server.stop().await;
    server.stop().await;
}
