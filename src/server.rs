//! Connection orchestration and TCP accept loop
//!
//! A [`Connection`] walks `AwaitingHandshake -> Open -> Closed`: one
//! handshake, then decode/reply until the peer sends close, a frame fails
//! to decode, or the stream breaks. [`serve_connection`] drives that over
//! any async stream; [`WebSocketServer`] binds a listener and spawns one
//! task per accepted socket. Connections share nothing, so tasks need no
//! synchronization.
//!
//! # Example
//!
//! ```ignore
//! use ws_echo::server::{ConnectionMode, ServerConfig, WebSocketServer};
//!
//! let config = ServerConfig {
//!     mode: ConnectionMode::Single,
//!     ..ServerConfig::default()
//! };
//! let server = WebSocketServer::bind(config)
//!     .await?
//!     .with_handler(|text| Some(text.to_uppercase()));
//! server
//!     .run_until(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};

use crate::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::handshake::{self, HandshakeResult};
use crate::protocol::{self, Message};
use crate::stream::ByteStream;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8888;

/// Pause before accepting again after a listener-level failure
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Application behaviour applied to each inbound text message
///
/// `Some(reply)` is sent back as a text frame; `None` sends nothing.
pub type Handler = Arc<dyn Fn(String) -> Option<String> + Send + Sync>;

/// How many messages a connection serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Reply to one message, then close
    Single,
    /// Serve until the peer closes or an error occurs
    #[default]
    Loop,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (default: 127.0.0.1:8888)
    pub addr: SocketAddr,
    /// Per-connection message policy (default: Loop)
    pub mode: ConnectionMode,
    /// Set TCP_NODELAY on accepted sockets (default: true)
    pub nodelay: bool,
    /// Negotiator and codec limits
    pub ws: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            mode: ConnectionMode::Loop,
            nodelay: true,
            ws: Config::default(),
        }
    }
}

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the upgrade request
    AwaitingHandshake,
    /// Framed traffic allowed
    Open,
    /// Torn down; no further traffic
    Closed,
}

/// One connection's protocol state over a byte stream
#[derive(Debug)]
pub struct Connection<S> {
    stream: ByteStream<S>,
    config: Config,
    state: ConnectionState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a fresh stream
    pub fn new(stream: S, config: Config) -> Self {
        Self {
            stream: ByteStream::new(stream),
            config,
            state: ConnectionState::AwaitingHandshake,
        }
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run the upgrade handshake; any failure closes the connection
    pub async fn handshake(&mut self) -> Result<HandshakeResult> {
        if self.state != ConnectionState::AwaitingHandshake {
            return Err(Error::InvalidState("handshake already performed"));
        }

        match handshake::negotiate(&mut self.stream, &self.config).await {
            Ok(result) => {
                self.state = ConnectionState::Open;
                Ok(result)
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    /// Decode the next message
    ///
    /// Returns `Ok(None)` once the peer requested close. Decode errors
    /// close the connection and are returned.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        self.ensure_open()?;

        match protocol::decode_frame(&mut self.stream, &self.config).await {
            Ok(Message::Text(text)) => Ok(Some(text)),
            Ok(Message::CloseRequested) => {
                self.state = ConnectionState::Closed;
                Ok(None)
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    /// Send a text message
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;

        let result = protocol::send_text(&mut self.stream, text).await;
        if result.is_err() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    /// Shut down the write half and release the transport
    pub async fn close(mut self) -> S {
        self.state = ConnectionState::Closed;
        let unread = self.stream.buffered().len();
        if unread > 0 {
            debug!(unread, "discarding unread bytes");
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "shutdown failed");
        }
        self.stream.into_inner()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ConnectionState::Open => Ok(()),
            ConnectionState::AwaitingHandshake => {
                Err(Error::InvalidState("handshake not performed"))
            }
            ConnectionState::Closed => Err(Error::ConnectionClosed),
        }
    }
}

/// Drive one connection to completion
///
/// Returns the number of text messages handled. On error the stream is
/// dropped without a closing shutdown.
pub async fn serve_connection<S, F>(
    stream: S,
    config: &Config,
    mode: ConnectionMode,
    handler: &F,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(String) -> Option<String> + ?Sized,
{
    let mut conn = Connection::new(stream, config.clone());
    let handshake = conn.handshake().await?;
    debug!(path = %handshake.path, "connection open");

    let mut handled = 0u64;
    while let Some(text) = conn.recv().await? {
        handled += 1;
        debug!(len = text.len(), "text message received");

        if let Some(reply) = handler(text) {
            conn.send(&reply).await?;
        }

        if mode == ConnectionMode::Single {
            break;
        }
    }

    conn.close().await;
    Ok(handled)
}

/// Echo handler: replies with the received text
pub fn echo() -> Handler {
    Arc::new(|text: String| Some(text))
}

/// WebSocket server bound to a TCP listener
pub struct WebSocketServer {
    listener: TcpListener,
    config: ServerConfig,
    handler: Handler,
}

impl WebSocketServer {
    /// Bind the configured address with the echo handler
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.addr).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Use an already bound listener; `config.addr` is ignored
    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            config,
            handler: echo(),
        }
    }

    /// Replace the message handler
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Option<String> + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Connections already spawned keep running to completion. A failed
    /// `accept` never stops the loop: errors tied to the pending connection
    /// are logged and skipped, anything else (e.g. `EMFILE`) is logged and
    /// retried after a short backoff.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(%addr, mode = ?self.config.mode, "listening");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(%addr, "shutting down listener");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) if is_connection_error(&e) => {
                            debug!(error = %e, "accept failed for pending connection");
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed, backing off");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "failed to set TCP_NODELAY");
            }
        }

        let config = self.config.ws.clone();
        let mode = self.config.mode;
        let handler = Arc::clone(&self.handler);

        tokio::spawn(handle_connection(stream, peer, config, mode, handler));
    }
}

impl std::fmt::Debug for WebSocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("config", &self.config)
            .finish()
    }
}

/// Whether an `accept` failure concerns only the connection being accepted
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

#[instrument(skip_all, fields(%peer))]
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Config,
    mode: ConnectionMode,
    handler: Handler,
) {
    info!("connection accepted");

    match serve_connection(stream, &config, mode, &*handler).await {
        Ok(handled) => info!(messages = handled, "connection closed"),
        Err(e) => match e.kind() {
            ErrorKind::MalformedRequest => warn!(error = %e, "handshake failed"),
            ErrorKind::ProtocolViolation => warn!(error = %e, "protocol violation, closing"),
            ErrorKind::Stream => debug!(error = %e, "stream error, closing"),
            ErrorKind::InvalidState => warn!(error = %e, "connection misuse"),
        },
    }
}
