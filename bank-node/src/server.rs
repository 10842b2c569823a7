//! TCP connection server
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start()--> Listening --stop()--> Stopped
//! ```
//!
//! Starting binds the listener, flips the ledger's online flag and spawns the
//! accept loop. Every accepted socket gets its own session task:
//!
//! ```text
//! Accepted -> Reading -> Dispatching -> Writing -> Reading ... -> Closed
//! ```
//!
//! A session only ends on EOF, a transport error or idle timeout. A bad
//! command, an overlong line or bytes that are not UTF-8 are answered with
//! `ER` and the session keeps reading. Stopping
//! cancels the accept loop and closes the listener; open sessions are left
//! to finish on their own.

use crate::client::{PeerClient, PeerTransport};
use crate::dispatcher::Dispatcher;
use crate::metrics::NodeMetrics;
use crate::protocol::Response;
use crate::{Config, Error, Result};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use ledger_core::Ledger;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{
    AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder, Framed,
};
use tokio_util::sync::CancellationToken;

/// Per-session limits
#[derive(Debug, Clone, Copy)]
struct SessionSettings {
    idle_timeout: Duration,
    max_line_length: usize,
}

/// One framed request
#[derive(Debug, Clone, PartialEq, Eq)]
enum RequestLine {
    /// Line content without the terminator
    Line(String),

    /// Line exceeded the length limit and was discarded
    TooLong,
}

/// Newline-delimited framing that never ends the stream on bad input
///
/// Lines are decoded lossily so invalid UTF-8 still reaches the parser, and
/// an overlong line is reported as an item while the inner codec skips to
/// the next newline.
#[derive(Debug)]
struct RequestCodec {
    inner: AnyDelimiterCodec,
}

impl RequestCodec {
    fn new(max_line_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                max_line_length,
            ),
        }
    }

    fn frame(
        decoded: std::result::Result<Option<bytes::Bytes>, AnyDelimiterCodecError>,
    ) -> std::result::Result<Option<RequestLine>, AnyDelimiterCodecError> {
        match decoded {
            Ok(Some(chunk)) => {
                let line = String::from_utf8_lossy(&chunk);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                Ok(Some(RequestLine::Line(line.to_string())))
            }
            Ok(None) => Ok(None),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(RequestLine::TooLong)),
            Err(e) => Err(e),
        }
    }
}

impl Decoder for RequestCodec {
    type Item = RequestLine;
    type Error = AnyDelimiterCodecError;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<RequestLine>, AnyDelimiterCodecError> {
        Self::frame(self.inner.decode(buf))
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<RequestLine>, AnyDelimiterCodecError> {
        Self::frame(self.inner.decode_eof(buf))
    }
}

impl Encoder<String> for RequestCodec {
    type Error = AnyDelimiterCodecError;

    fn encode(
        &mut self,
        line: String,
        dst: &mut BytesMut,
    ) -> std::result::Result<(), AnyDelimiterCodecError> {
        self.inner.encode(line, dst)
    }
}

/// Accept loop state while listening
struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Bank node TCP server
pub struct Server {
    config: Config,
    ledger: Ledger,
    dispatcher: Arc<Dispatcher>,
    metrics: NodeMetrics,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("bind_addr", &self.config.bind_addr())
            .field("local_addr", &self.local_addr())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl Server {
    /// Server using the TCP peer client for forwarding and scans
    pub fn new(config: Config, ledger: Ledger) -> Result<Self> {
        let transport = Arc::new(PeerClient::new(config.network_timeout()));
        Self::with_transport(config, ledger, transport)
    }

    /// Server with a custom peer transport
    pub fn with_transport(
        config: Config,
        ledger: Ledger,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics =
            NodeMetrics::new().map_err(|e| Error::Config(format!("metrics: {}", e)))?;
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            ledger.clone(),
            transport,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            ledger,
            dispatcher,
            metrics,
            running: Mutex::new(None),
        })
    }

    /// Bind and start accepting; returns the bound address
    pub async fn start(&self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            tracing::warn!(%addr, "Server already listening");
            return Ok(addr);
        }

        let listener = TcpListener::bind(self.config.bind_addr()).await.map_err(|e| {
            tracing::error!(addr = %self.config.bind_addr(), error = %e, "Failed to bind listener");
            Error::Io(e)
        })?;
        let local_addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let settings = SessionSettings {
            idle_timeout: self.config.session_idle_timeout(),
            max_line_length: self.config.max_line_length,
        };

        let task = tokio::spawn(accept_loop(
            listener,
            self.dispatcher.clone(),
            self.metrics.clone(),
            settings,
            cancel.clone(),
        ));

        *self.running.lock() = Some(Running {
            cancel,
            task,
            local_addr,
        });

        self.ledger.set_online(true);
        tracing::info!(%local_addr, address = %self.dispatcher.address(), "Bank node listening");

        Ok(local_addr)
    }

    /// Stop accepting and close the listener
    pub async fn stop(&self) {
        let running = self.running.lock().take();

        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.task.await {
                tracing::error!(error = %e, "Accept loop ended abnormally");
            }

            self.ledger.set_online(false);
            tracing::info!(local_addr = %running.local_addr, "Bank node stopped");
        }
    }

    /// Bound address while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    /// Whether the accept loop is running
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Request dispatcher
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Node metrics
    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    metrics: NodeMetrics,
    settings: SessionSettings,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    metrics.connections_total.inc();
                    let dispatcher = dispatcher.clone();
                    let metrics = metrics.clone();

                    tokio::spawn(async move {
                        metrics.active_connections.inc();
                        tracing::info!(%peer, "Client connected");

                        match handle_connection(stream, peer, &dispatcher, settings).await {
                            Ok(()) => tracing::info!(%peer, "Client disconnected"),
                            Err(e) => tracing::warn!(%peer, error = %e, "Connection closed with error"),
                        }

                        metrics.active_connections.dec();
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }

    tracing::debug!("Accept loop cancelled");
}

/// Run one request/response session until EOF, idle timeout or I/O error
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &Dispatcher,
    settings: SessionSettings,
) -> Result<()> {
    let mut lines = Framed::new(stream, RequestCodec::new(settings.max_line_length));

    loop {
        let next = match tokio::time::timeout(settings.idle_timeout, lines.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::info!(%peer, "Session idle, closing");
                return Ok(());
            }
        };

        let response = match next {
            None => return Ok(()),
            Some(Ok(RequestLine::Line(line))) => {
                tracing::debug!(%peer, request = %line, "Command received");
                dispatcher.dispatch(&line).await
            }
            Some(Ok(RequestLine::TooLong)) => {
                tracing::debug!(%peer, limit = settings.max_line_length, "Request line too long");
                Response::Error("Request line too long".to_string()).to_string()
            }
            Some(Err(e)) => return Err(codec_error(e)),
        };

        tracing::debug!(%peer, response = %response, "Response sent");
        lines.send(response).await.map_err(codec_error)?;
    }
}

fn codec_error(err: AnyDelimiterCodecError) -> Error {
    match err {
        AnyDelimiterCodecError::Io(e) => Error::Io(e),
        other => Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, other)),
    }
}
