//! TCP transport for the client.
//!
//! [`TcpDialer`] is the production [`Dialer`]: it opens a TCP stream to the
//! server, optionally bounded by a connect timeout, and wraps it as a
//! [`PendingConnection`] ready for the handshake.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use chat_core::PendingConnection;
use tokio::net::TcpStream;
use tracing::debug;

use crate::application::link::Dialer;

/// Connects over TCP.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    /// `connect_timeout` of `None` waits as long as the OS does.
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: SocketAddr) -> io::Result<PendingConnection> {
        let connect = TcpStream::connect(addr);
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                io::Error::new(io::ErrorKind::TimedOut, "timed out connecting to server")
            })??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;
        debug!(%addr, "tcp connected");
        Ok(PendingConnection::from_tcp(stream))
    }
}
