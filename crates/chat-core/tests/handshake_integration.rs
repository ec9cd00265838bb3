//! Integration tests for the authenticated connection over real TCP.
//!
//! These tests bind a listener on `127.0.0.1:0`, run both ends of the
//! handshake through the public API, and then exchange chat chunks, so the
//! codec, the proof exchange, and the split read/write halves are exercised
//! together on an actual socket.

use std::time::Duration;

use chat_core::{
    ChatMessage, ControlSignal, Credentials, HandshakeError, Inbound, PendingConnection, Role,
};
use tokio::net::{TcpListener, TcpStream};

async fn tcp_pair() -> (PendingConnection, PendingConnection) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (
        PendingConnection::from_tcp(client.unwrap()),
        PendingConnection::from_tcp(accepted.unwrap().0),
    )
}

#[tokio::test]
async fn test_tcp_handshake_then_chat_both_ways() {
    // Arrange
    let creds = Credentials::new("integration").unwrap();
    let (client, server) = tcp_pair().await;

    // Act
    let (client, server) = tokio::join!(
        client.authenticate(Role::Client, &creds),
        server.authenticate(Role::Server, &creds)
    );
    let (client, server) = (client.unwrap(), server.unwrap());

    client
        .write(&ChatMessage::from_client("hello").to_wire())
        .await
        .unwrap();
    let at_server = server.read_chunk().await.unwrap().unwrap();

    server
        .write(&ChatMessage::from_server("hi").to_wire())
        .await
        .unwrap();
    let at_client = client.read_chunk().await.unwrap().unwrap();

    // Assert
    assert_eq!(Inbound::from_chunk(&at_server).text(), "Client: hello");
    assert_eq!(Inbound::from_chunk(&at_client).text(), "Server: hi");
}

#[tokio::test]
async fn test_tcp_wrong_secret_never_yields_a_connection() {
    let (client, server) = tcp_pair().await;
    let client_creds = Credentials::new("alpha").unwrap();
    let server_creds = Credentials::new("beta").unwrap();

    let (client, server) = tokio::join!(
        client.authenticate(Role::Client, &client_creds),
        server.authenticate(Role::Server, &server_creds)
    );

    assert!(matches!(client, Err(HandshakeError::ServerProofMismatch)));
    assert!(server.is_err());
}

#[tokio::test]
async fn test_tcp_silent_client_times_out_on_server() {
    let (client, server) = tcp_pair().await;
    let creds = Credentials::new("integration").unwrap();

    let result = server
        .authenticate_within(Role::Server, &creds, Some(Duration::from_millis(100)))
        .await;

    assert!(matches!(result, Err(HandshakeError::TimedOut)));
    drop(client);
}

#[tokio::test]
async fn test_tcp_shutdown_sentinel_then_eof() {
    // Arrange
    let creds = Credentials::new("integration").unwrap();
    let (client, server) = tcp_pair().await;
    let (client, server) = tokio::join!(
        client.authenticate(Role::Client, &creds),
        server.authenticate(Role::Server, &creds)
    );
    let (client, server) = (client.unwrap(), server.unwrap());

    // Act – what a stopping server does to each connection
    server
        .write(&ControlSignal::ServerStopping.to_wire())
        .await
        .unwrap();
    server.close().await;

    // Assert
    let chunk = client.read_chunk().await.unwrap().unwrap();
    assert!(matches!(
        Inbound::from_chunk(&chunk),
        Inbound::ServerStopping { .. }
    ));
    assert!(client.read_chunk().await.unwrap().is_none());
}
