//! Outbound peer requests
//!
//! Callers always get a response line back: connection failures, timeouts
//! and empty answers become `ER <description>` lines.

use crate::protocol::Response;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// One request line to a peer, one response line back
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Send `line` to `host:port`; never fails, errors come back as `ER` lines
    async fn send_request(&self, host: &str, port: u16, line: &str) -> String;
}

/// TCP peer client
#[derive(Debug, Clone)]
pub struct PeerClient {
    timeout: Duration,
}

impl PeerClient {
    /// Client bounding connect, write and read by `timeout` each
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Typed exchange; `send_request` maps the error to an `ER` line
    pub async fn request(&self, host: &str, port: u16, line: &str) -> Result<String> {
        let stream = timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::NetworkUnreachable("Connection timed out".to_string()))?
            .map_err(|e| Error::NetworkUnreachable(format!("Network error: {}", e)))?;

        let mut reader = BufReader::new(stream);

        let mut payload = line.trim_end().as_bytes().to_vec();
        payload.push(b'\n');

        timeout(self.timeout, reader.get_mut().write_all(&payload))
            .await
            .map_err(|_| Error::NetworkUnreachable("Write timed out".to_string()))?
            .map_err(|e| Error::NetworkUnreachable(format!("Network error: {}", e)))?;

        let mut response = String::new();
        timeout(self.timeout, reader.read_line(&mut response))
            .await
            .map_err(|_| Error::NetworkUnreachable("Response timed out".to_string()))?
            .map_err(|e| Error::NetworkUnreachable(format!("Network error: {}", e)))?;

        let response = response.trim();
        if response.is_empty() {
            return Err(Error::NetworkUnreachable(
                "Network error: empty response from peer".to_string(),
            ));
        }

        Ok(response.to_string())
    }
}

#[async_trait]
impl PeerTransport for PeerClient {
    async fn send_request(&self, host: &str, port: u16, line: &str) -> String {
        match self.request(host, port, line).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(host, port, error = %e, "Peer request failed");
                Response::from(e).to_string()
            }
        }
    }
}
