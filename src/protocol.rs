//! Frame codec: inbound frames to messages, outbound text to frames
//!
//! Decoding reads one frame per call from a [`ByteStream`], resolving the
//! three-tier payload length, the optional masking key and the payload
//! itself. Nothing is kept between calls; a frame that fails halfway cannot
//! be resumed and the connection has to be torn down.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::Config;
use crate::error::{Error, Result};
use crate::frame::{BaseHeader, OpCode, PayloadLength, encode_frame_into};
use crate::mask::apply_mask;
use crate::stream::ByteStream;
use crate::utf8::decode_text;

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Unmasked, UTF-8 validated text payload
    Text(String),
    /// The peer sent a close frame
    CloseRequested,
}

impl Message {
    /// Create a text message
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Check if this is a close request
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Message::CloseRequested)
    }

    /// Get message as text (returns None for close requests)
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::CloseRequested => None,
        }
    }

    /// Convert to text (returns None for close requests)
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(s) => Some(s),
            Message::CloseRequested => None,
        }
    }
}

/// Decode one frame from the stream
///
/// A close frame returns [`Message::CloseRequested`] right after the base
/// header, without reading its length or payload. A header that breaks the
/// layout fails before any payload byte is consumed. Short reads surface as
/// stream errors, distinct from protocol violations.
pub async fn decode_frame<S>(stream: &mut ByteStream<S>, config: &Config) -> Result<Message>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (masked, length) = match BaseHeader::parse(stream.read_array::<2>().await?)? {
        BaseHeader::Close => {
            trace!("close frame received");
            return Ok(Message::CloseRequested);
        }
        BaseHeader::Text { masked, length } => (masked, length),
    };

    if config.require_masked && !masked {
        return Err(Error::ProtocolViolation("client frames must be masked"));
    }

    let payload_len = match length {
        PayloadLength::Short(n) => n as u64,
        PayloadLength::Extended16 => u16::from_be_bytes(stream.read_array::<2>().await?) as u64,
        PayloadLength::Extended64 => u64::from_be_bytes(stream.read_array::<8>().await?),
    };

    if payload_len > config.max_payload_size as u64 {
        return Err(Error::FrameTooLarge(payload_len));
    }

    let mask = if masked {
        Some(stream.read_array::<4>().await?)
    } else {
        None
    };

    trace!(payload_len, masked, "text frame header");

    // Bounded by max_payload_size, which is a usize
    let mut payload = stream.read_exact(payload_len as usize).await?;
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Message::Text(decode_text(&payload)?.to_owned()))
}

/// Encode `text` as a single final, unmasked text frame
pub fn encode_frame(text: &str) -> Bytes {
    let mut buf = BytesMut::new();
    encode_frame_into(&mut buf, OpCode::Text, text.as_bytes(), None);
    buf.freeze()
}

/// Encode `text` and write it as one flushed write
pub async fn send_text<S>(stream: &mut ByteStream<S>, text: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = encode_frame(text);
    trace!(len = frame.len(), "sending text frame");
    stream.write(&frame).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn client_frame(payload: &[u8], mask: Option<[u8; 4]>) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame_into(&mut buf, OpCode::Text, payload, mask);
        buf
    }

    async fn pipe_with(bytes: &[u8]) -> (DuplexStream, ByteStream<DuplexStream>) {
        let (mut client, server) = duplex(1 << 20);
        client.write_all(bytes).await.unwrap();
        (client, ByteStream::new(server))
    }

    fn text_payload(len: usize) -> String {
        (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect()
    }

    #[tokio::test]
    async fn test_length_tiers_round_trip_unmasked() {
        let config = Config::default();
        for len in [0, 1, 125, 126, 127, 65535, 65536] {
            let text = text_payload(len);
            let (_client, mut stream) = pipe_with(&client_frame(text.as_bytes(), None)).await;

            let msg = decode_frame(&mut stream, &config).await.unwrap();
            assert_eq!(msg, Message::Text(text), "length {}", len);
            assert!(stream.buffered().is_empty());
        }
    }

    #[tokio::test]
    async fn test_length_tiers_round_trip_masked() {
        let config = Config::default();
        for len in [0, 1, 125, 126, 127, 65535, 65536] {
            let text = text_payload(len);
            let (_client, mut stream) = pipe_with(&client_frame(text.as_bytes(), Some(KEY))).await;

            let msg = decode_frame(&mut stream, &config).await.unwrap();
            assert_eq!(msg.as_text(), Some(text.as_str()), "length {}", len);
        }
    }

    #[tokio::test]
    async fn test_rfc_masked_hello() {
        let bytes = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let (_client, mut stream) = pipe_with(&bytes).await;

        let msg = decode_frame(&mut stream, &Config::default()).await.unwrap();
        assert_eq!(msg, Message::text("Hello"));
    }

    #[tokio::test]
    async fn test_back_to_back_frames() {
        let mut bytes = client_frame(b"first", Some(KEY));
        bytes.extend_from_slice(&client_frame(b"second", Some([9, 8, 7, 6])));
        let (_client, mut stream) = pipe_with(&bytes).await;

        let config = Config::default();
        assert_eq!(
            decode_frame(&mut stream, &config).await.unwrap(),
            Message::text("first")
        );
        assert_eq!(
            decode_frame(&mut stream, &config).await.unwrap(),
            Message::text("second")
        );
    }

    #[tokio::test]
    async fn test_close_reads_only_base_header() {
        // 127 would announce an 8-byte length that never arrives
        let (client, mut stream) = pipe_with(&[0x88, 0xFF]).await;
        drop(client);

        let msg = decode_frame(&mut stream, &Config::default()).await.unwrap();
        assert!(msg.is_close());
        assert_eq!(msg.into_text(), None);
    }

    #[tokio::test]
    async fn test_reserved_bits_do_not_consume_payload() {
        let (client, mut stream) = pipe_with(&[0xC1, 0x05, b'h', b'e', b'l', b'l', b'o']).await;
        drop(client);

        let err = decode_frame(&mut stream, &Config::default())
            .await
            .unwrap_err();
        assert!(err.is_protocol_violation());

        let rest = stream.read_exact(5).await.unwrap();
        assert_eq!(&rest[..], b"hello");
    }

    #[tokio::test]
    async fn test_fragment_rejected() {
        let (_client, mut stream) = pipe_with(&[0x01, 0x03, b'a', b'b', b'c']).await;
        let err = decode_frame(&mut stream, &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_unknown_opcode_rejected() {
        // Binary frame
        let (_client, mut stream) = pipe_with(&[0x82, 0x01, 0x00]).await;
        let err = decode_frame(&mut stream, &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation("unknown opcode")));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let (_client, mut stream) = pipe_with(&client_frame(&[0xff, 0xfe, 0xfd], Some(KEY))).await;
        let err = decode_frame(&mut stream, &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8));
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_short_payload_is_stream_error() {
        let mut bytes = client_frame(b"truncated payload", Some(KEY));
        bytes.truncate(bytes.len() - 4);
        let (client, mut stream) = pipe_with(&bytes).await;
        drop(client);

        let err = decode_frame(&mut stream, &Config::default())
            .await
            .unwrap_err();
        assert!(err.is_stream_error());
    }

    #[tokio::test]
    async fn test_require_masked() {
        let config = Config::builder().require_masked(true).build();
        let (_client, mut stream) = pipe_with(&client_frame(b"plain", None)).await;

        let err = decode_frame(&mut stream, &config).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolViolation("client frames must be masked")
        ));
    }

    #[tokio::test]
    async fn test_frame_too_large_before_payload() {
        let config = Config::builder().max_payload_size(16).build();
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&[0x81, 0xFF]);
        bytes.extend_from_slice(&(1u64 << 40).to_be_bytes());
        let (_client, mut stream) = pipe_with(&bytes).await;

        let err = decode_frame(&mut stream, &config).await.unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(len) if len == 1 << 40));
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame("hi");
        assert_eq!(&frame[..], &[0x81, 0x02, b'h', b'i']);
    }

    #[tokio::test]
    async fn test_encode_frame_decodes_as_client() {
        // A client-side decoder applies no unmasking to server frames
        let config = Config::builder().require_masked(false).build();
        for len in [0, 5, 125, 126, 65535, 65536, 70_000] {
            let text = text_payload(len);
            let frame = encode_frame(&text);
            assert_eq!(frame[1] & 0x80, 0);

            let (_client, mut stream) = pipe_with(&frame).await;
            let msg = decode_frame(&mut stream, &config).await.unwrap();
            assert_eq!(msg, Message::Text(text));
        }
    }

    #[tokio::test]
    async fn test_send_text() {
        let (client, server) = duplex(1024);
        let mut server = ByteStream::new(server);
        send_text(&mut server, "echo").await.unwrap();

        let mut client = ByteStream::new(client);
        let got = client.read_exact(6).await.unwrap();
        assert_eq!(&got[..], &[0x81, 0x04, b'e', b'c', b'h', b'o']);
    }
}
