//! UTF-8 validation for text payloads
//!
//! Backed by `simdutf8`, which picks SSE4.2/AVX2 on x86-64, NEON on aarch64
//! and falls back to std elsewhere.

use crate::error::{Error, Result};

/// View `data` as text, failing with [`Error::InvalidUtf8`] on malformed input
#[inline]
pub fn decode_text(data: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(data).map_err(|_| Error::InvalidUtf8)
}

/// Validate that the input is valid UTF-8
#[inline]
pub fn validate_utf8(data: &[u8]) -> bool {
    simdutf8::basic::from_utf8(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid() {
        assert!(validate_utf8(b""));
        assert!(validate_utf8(b"hello"));
        assert!(validate_utf8("Hello, 世界! 🎉".as_bytes()));
    }

    #[test]
    fn test_invalid() {
        // Lone continuation byte
        assert!(!validate_utf8(&[0x80]));
        // Truncated 3-byte sequence
        assert!(!validate_utf8(&[0xe4, 0xb8]));
        // Overlong encoding of '/'
        assert!(!validate_utf8(&[0xc0, 0xaf]));
        // UTF-16 surrogate
        assert!(!validate_utf8(&[0xed, 0xa0, 0x80]));
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text("héllo".as_bytes()).unwrap(), "héllo");
        assert!(matches!(decode_text(&[0xff, 0xfe]), Err(Error::InvalidUtf8)));
    }
}
