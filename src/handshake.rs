//! WebSocket handshake implementation
//!
//! Reads the HTTP upgrade request up to the blank line, extracts
//! `Sec-WebSocket-Key` (header names compare case-insensitively), derives
//! the accept token and writes the fixed `101 Switching Protocols` response.
//!
//! The header block is read under a byte budget (`Config::max_header_size`)
//! so a peer cannot make the server buffer without bound.

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{Error, Result};
use crate::stream::ByteStream;
use crate::{Config, WS_GUID};

/// End of the HTTP header block
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parsed upgrade request
#[derive(Debug)]
pub struct HandshakeRequest<'a> {
    /// The request method
    pub method: &'a str,
    /// The request path
    pub path: &'a str,
    /// The Host header
    pub host: Option<&'a str>,
    /// The Sec-WebSocket-Key header
    pub key: &'a str,
    /// The Sec-WebSocket-Version header
    pub version: Option<&'a str>,
    /// The Origin header
    pub origin: Option<&'a str>,
    /// `Upgrade` header contains `websocket`
    pub upgrade: bool,
    /// `Connection` header contains `upgrade`
    pub connection_upgrade: bool,
}

/// Parse a complete header block
///
/// Only `Sec-WebSocket-Key` is required. With `strict` set the request must
/// also be a `GET` carrying `Upgrade: websocket`, `Connection: Upgrade` and
/// `Sec-WebSocket-Version: 13`.
pub fn parse_request(buf: &[u8], strict: bool) -> Result<HandshakeRequest<'_>> {
    let mut headers = vec![httparse::EMPTY_HEADER; header_slots(buf)];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(Error::MalformedRequest("incomplete header block"));
        }
        Err(_) => return Err(Error::MalformedRequest("failed to parse HTTP request")),
    }

    let mut key = None;
    let mut version = None;
    let mut host = None;
    let mut origin = None;
    let mut upgrade = false;
    let mut connection_upgrade = false;

    // Values are only decoded for the headers we look at
    for header in req.headers.iter() {
        let name = header.name;
        if name.eq_ignore_ascii_case("sec-websocket-key") {
            key = Some(
                header_str(header.value)
                    .ok_or(Error::MalformedRequest("invalid Sec-WebSocket-Key"))?,
            );
        } else if name.eq_ignore_ascii_case("sec-websocket-version") {
            version = Some(header_str(header.value).unwrap_or(""));
        } else if name.eq_ignore_ascii_case("host") {
            host = header_str(header.value);
        } else if name.eq_ignore_ascii_case("origin") {
            origin = header_str(header.value);
        } else if name.eq_ignore_ascii_case("upgrade") {
            upgrade |= contains_token(header.value, b"websocket");
        } else if name.eq_ignore_ascii_case("connection") {
            connection_upgrade |= contains_token(header.value, b"upgrade");
        }
    }

    let key = key.ok_or(Error::MalformedRequest("missing Sec-WebSocket-Key"))?;
    if key.is_empty() {
        return Err(Error::MalformedRequest("empty Sec-WebSocket-Key"));
    }

    let method = req.method.unwrap_or("");

    if strict {
        if method != "GET" {
            return Err(Error::MalformedRequest("method must be GET"));
        }
        if !upgrade {
            return Err(Error::MalformedRequest("missing Upgrade: websocket"));
        }
        if !connection_upgrade {
            return Err(Error::MalformedRequest("missing Connection: Upgrade"));
        }
        match version {
            Some("13") => {}
            Some(_) => return Err(Error::MalformedRequest("unsupported WebSocket version")),
            None => return Err(Error::MalformedRequest("missing Sec-WebSocket-Version")),
        }
    }

    Ok(HandshakeRequest {
        method,
        path: req.path.unwrap_or("/"),
        host,
        key,
        version,
        origin,
        upgrade,
        connection_upgrade,
    })
}

/// Header slots needed for `buf`
///
/// Every header line ends in a newline, so the count never runs short of
/// what httparse needs. `buf` is already capped by the header byte budget.
fn header_slots(buf: &[u8]) -> usize {
    buf.iter().filter(|&&b| b == b'\n').count().max(1)
}

#[inline]
fn header_str(value: &[u8]) -> Option<&str> {
    std::str::from_utf8(value).ok().map(str::trim)
}

/// Case-insensitive substring match on a raw header value
fn contains_token(value: &[u8], token: &[u8]) -> bool {
    value
        .windows(token.len())
        .any(|window| window.eq_ignore_ascii_case(token))
}

/// Generate the Sec-WebSocket-Accept key
///
/// This computes: Base64(SHA-1(key + GUID))
#[inline]
pub fn generate_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Build the upgrade response
pub fn build_response(accept_key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);

    buf.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Accept: ");
    buf.put_slice(accept_key.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"\r\n");

    buf.freeze()
}

/// Result of a successful handshake
#[derive(Debug, Clone)]
pub struct HandshakeResult {
    /// The request path
    pub path: String,
    /// The Host header, if sent
    pub host: Option<String>,
    /// The Origin header, if sent
    pub origin: Option<String>,
    /// The accept token sent back to the client
    pub accept_key: String,
}

/// Perform the server-side handshake
///
/// Nothing is written unless the request parses; a stream that ends before
/// the blank line is a malformed request. Bytes the client sent after the
/// header block stay buffered in `stream` for the frame decoder.
pub async fn negotiate<S>(stream: &mut ByteStream<S>, config: &Config) -> Result<HandshakeResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = match stream
        .read_until(HEADER_TERMINATOR, config.max_header_size)
        .await
    {
        Ok(head) => head,
        Err(Error::ConnectionClosed) => {
            return Err(Error::MalformedRequest(
                "stream ended before end of header block",
            ));
        }
        Err(e) => return Err(e),
    };

    let req = parse_request(&head, config.strict_handshake)?;
    let accept_key = generate_accept_key(req.key);

    let result = HandshakeResult {
        path: req.path.to_string(),
        host: req.host.map(String::from),
        origin: req.origin.map(String::from),
        accept_key,
    };

    stream.write(&build_response(&result.accept_key)).await?;

    debug!(
        path = %result.path,
        host = ?result.host,
        header_bytes = head.len(),
        "upgrade handshake complete"
    );

    Ok(result)
}
