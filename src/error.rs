//! Error types for the handshake negotiator and frame codec

use std::io;

use thiserror::Error;

/// Result type alias for codec and negotiator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure category, used by the orchestrator to decide how to report a
/// connection teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The upgrade request was unusable; no frame traffic happened
    MalformedRequest,
    /// A frame broke the bit-layout contract or carried invalid text
    ProtocolViolation,
    /// The transport failed (short read, write failure, reset)
    Stream,
    /// An operation was called in the wrong connection state
    InvalidState,
}

/// WebSocket error types
#[derive(Debug, Error)]
pub enum Error {
    /// Upgrade request missing the terminator or a required header
    #[error("Malformed upgrade request: {0}")]
    MalformedRequest(&'static str),
    /// Frame header violates the wire layout
    #[error("Protocol violation: {0}")]
    ProtocolViolation(&'static str),
    /// Invalid UTF-8 in text message
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,
    /// Frame declares a payload above the configured limit
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(u64),
    /// I/O error from the underlying stream
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
    /// Peer closed the stream (EOF or broken pipe)
    #[error("Connection closed")]
    ConnectionClosed,
    /// Connection reset by peer
    #[error("Connection reset by peer")]
    ConnectionReset,
    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Error::ProtocolViolation(_) | Error::InvalidUtf8 | Error::FrameTooLarge(_) => {
                ErrorKind::ProtocolViolation
            }
            Error::Io(_) | Error::ConnectionClosed | Error::ConnectionReset => ErrorKind::Stream,
            Error::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// True for transport failures
    #[inline]
    pub fn is_stream_error(&self) -> bool {
        self.kind() == ErrorKind::Stream
    }

    /// True for frame layout or payload decoding failures
    #[inline]
    pub fn is_protocol_violation(&self) -> bool {
        self.kind() == ErrorKind::ProtocolViolation
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionReset => Error::ConnectionReset,
            io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}
