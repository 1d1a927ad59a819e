use std::fmt;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Minimum spare capacity reserved before each socket read
const READ_CHUNK: usize = 4096;

/// Buffered bidirectional byte stream
///
/// Reads pull from the transport into an internal `BytesMut` and hand out
/// exactly the requested bytes; anything read past that stays buffered for
/// the next call. Writes go straight to the transport and are flushed.
pub struct ByteStream<S> {
    inner: S,
    read_buf: BytesMut,
}

impl<S> ByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a transport
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Read exactly `n` bytes
    ///
    /// The result is mutable so callers can unmask a payload in place.
    /// Fails with [`Error::ConnectionClosed`] if the peer closes first.
    pub async fn read_exact(&mut self, n: usize) -> Result<BytesMut> {
        if self.read_buf.len() < n {
            self.read_buf.reserve(n - self.read_buf.len());
        }
        while self.read_buf.len() < n {
            self.fill().await?;
        }
        Ok(self.read_buf.split_to(n))
    }

    /// Read exactly `N` bytes into a fixed-size array
    pub async fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_exact(N).await?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Read up to and including the first occurrence of `delimiter`
    ///
    /// At most `limit` bytes are buffered while searching; past that the
    /// read fails with [`Error::MalformedRequest`]. EOF before the delimiter
    /// fails with [`Error::ConnectionClosed`].
    pub async fn read_until(&mut self, delimiter: &[u8], limit: usize) -> Result<Bytes> {
        if delimiter.is_empty() {
            return Ok(Bytes::new());
        }

        // Bytes before this offset were already searched
        let mut searched = 0;

        loop {
            if let Some(pos) = find(&self.read_buf[searched..], delimiter) {
                let end = searched + pos + delimiter.len();
                if end > limit {
                    return Err(Error::MalformedRequest("header block exceeds size limit"));
                }
                return Ok(self.read_buf.split_to(end).freeze());
            }

            if self.read_buf.len() >= limit {
                return Err(Error::MalformedRequest("header block exceeds size limit"));
            }

            searched = self.read_buf.len().saturating_sub(delimiter.len() - 1);
            self.fill().await?;
        }
    }

    /// Write all bytes and flush
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Bytes received but not yet consumed
    #[inline]
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf
    }

    /// Release the transport, dropping any buffered bytes
    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn fill(&mut self) -> Result<()> {
        self.read_buf.reserve(READ_CHUNK);
        let n = self.inner.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

impl<S> fmt::Debug for ByteStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("buffered", &self.read_buf.len())
            .finish()
    }
}

#[inline]
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_exact_keeps_remainder() {
        let (mut client, server) = duplex(1024);
        client.write_all(b"abcdef").await.unwrap();

        let mut stream = ByteStream::new(server);
        let first = stream.read_exact(2).await.unwrap();
        assert_eq!(&first[..], b"ab");

        let rest = stream.read_exact(4).await.unwrap();
        assert_eq!(&rest[..], b"cdef");
        assert!(stream.buffered().is_empty());
    }

    #[tokio::test]
    async fn test_read_exact_short_read() {
        let (mut client, server) = duplex(1024);
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let mut stream = ByteStream::new(server);
        let err = stream.read_exact(8).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_until_delimiter_split_across_writes() {
        let (mut client, server) = duplex(1024);
        let mut stream = ByteStream::new(server);

        let writer = tokio::spawn(async move {
            client.write_all(b"GET / HTTP/1.1\r\n\r").await.unwrap();
            tokio::task::yield_now().await;
            client.write_all(b"\n\x81\x00").await.unwrap();
            client
        });

        let head = stream.read_until(b"\r\n\r\n", 1024).await.unwrap();
        assert_eq!(&head[..], b"GET / HTTP/1.1\r\n\r\n");

        let _client = writer.await.unwrap();
        let frame = stream.read_exact(2).await.unwrap();
        assert_eq!(&frame[..], &[0x81, 0x00]);
    }

    #[tokio::test]
    async fn test_read_until_limit() {
        let (mut client, server) = duplex(4096);
        client.write_all(&[b'a'; 256]).await.unwrap();

        let mut stream = ByteStream::new(server);
        let err = stream.read_until(b"\r\n\r\n", 64).await.unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_read_until_eof() {
        let (mut client, server) = duplex(1024);
        client.write_all(b"no terminator").await.unwrap();
        drop(client);

        let mut stream = ByteStream::new(server);
        let err = stream.read_until(b"\r\n\r\n", 1024).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_write_flushes() {
        let (client, server) = duplex(1024);
        let mut stream = ByteStream::new(server);
        stream.write(b"hello").await.unwrap();

        let mut client = ByteStream::new(client);
        let got = client.read_exact(5).await.unwrap();
        assert_eq!(&got[..], b"hello");
    }
}
