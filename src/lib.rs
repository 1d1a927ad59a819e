//! # ws-echo: RFC 6455 text-frame echo server
//!
//! The protocol engine behind a minimal WebSocket server: the HTTP upgrade
//! handshake and a single-frame text codec, layered over any tokio
//! `AsyncRead + AsyncWrite` byte stream.
//!
//! - [`handshake`]: reads the upgrade request under a byte budget, derives
//!   `Sec-WebSocket-Accept`, writes the `101` response
//! - [`protocol`]: decodes inbound frames into [`Message`]s and encodes
//!   outbound text as unmasked frames
//! - [`server`]: per-connection orchestration and a TCP accept loop
//!
//! Fragmentation, ping/pong, extensions and the close handshake are not
//! implemented: fragments and unknown opcodes are rejected, a close frame
//! simply ends the connection.
//!
//! ## Example
//!
//! ```ignore
//! use ws_echo::server::{ServerConfig, WebSocketServer};
//!
//! let server = WebSocketServer::bind(ServerConfig::default()).await?;
//! server.run().await?;
//! ```

pub mod error;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod protocol;
pub mod server;
pub mod stream;
pub mod utf8;

pub use error::{Error, ErrorKind, Result};
pub use frame::OpCode;
pub use protocol::{Message, decode_frame, encode_frame};
pub use server::{ConnectionMode, ServerConfig, WebSocketServer};
pub use stream::ByteStream;

/// Largest payload that fits the 7-bit length field
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Largest payload that fits the 16-bit extended length
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// WebSocket GUID for handshake
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Default byte budget for the upgrade request header block
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8192;

/// Default maximum payload of a single inbound frame (16MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Limits applied by the negotiator and the frame decoder
///
/// # Example
///
/// ```
/// use ws_echo::Config;
///
/// let config = Config::builder()
///     .max_header_size(4096)
///     .max_payload_size(64 * 1024)
///     .require_masked(true)
///     .build();
/// assert!(config.require_masked);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum size of the upgrade request header block (default: 8KB)
    pub max_header_size: usize,
    /// Maximum payload of one inbound frame (default: 16MB)
    pub max_payload_size: usize,
    /// Reject unmasked client frames (default: false)
    pub require_masked: bool,
    /// Require GET, Upgrade, Connection and version 13 in the upgrade
    /// request, not just the key (default: false)
    pub strict_handshake: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            require_masked: false,
            strict_handshake: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for [`Config`]
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the header block byte budget
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.config.max_header_size = size;
        self
    }

    /// Set the maximum inbound frame payload
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Reject unmasked client frames
    pub fn require_masked(mut self, enabled: bool) -> Self {
        self.config.require_masked = enabled;
        self
    }

    /// Enable strict upgrade request validation
    pub fn strict_handshake(mut self, enabled: bool) -> Self {
        self.config.strict_handshake = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.max_header_size, 8192);
        assert_eq!(config.max_payload_size, 16 * 1024 * 1024);
        assert!(!config.require_masked);
        assert!(!config.strict_handshake);
        assert_eq!(Config::builder().build(), config);
    }
}
