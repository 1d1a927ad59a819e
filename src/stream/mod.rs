//! Byte-stream abstraction consumed by the negotiator and the frame codec
//!
//! The codec never touches a socket directly. It reads and writes through
//! [`ByteStream`], which wraps any `AsyncRead + AsyncWrite` transport (TCP,
//! TLS, an in-memory duplex pipe in tests) and keeps its own read buffer so
//! that bytes arriving right behind the handshake terminator are not lost.
//!
//! ```ignore
//! use tokio::net::TcpStream;
//! use ws_echo::stream::ByteStream;
//!
//! let tcp = TcpStream::connect("127.0.0.1:8888").await?;
//! let mut stream = ByteStream::new(tcp);
//! let header = stream.read_exact(2).await?;
//! ```

mod byte_stream;

pub use byte_stream::ByteStream;
