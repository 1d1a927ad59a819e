//! WebSocket frame layout
//!
//! Bit-level decoding of the 2-byte base header and serialization of
//! outbound frames, per RFC 6455 section 5.2:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! Only single-frame text messages and close frames are supported.
//! Continuation frames and every other opcode are protocol violations.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::mask::apply_mask;
use crate::{MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD};

/// First header nibble of an accepted frame: FIN set, RSV1-3 clear
const FIN_ONLY: u8 = 0b1000;

/// 7-bit length marker announcing a 16-bit extended length
const LEN_MARKER_16: u8 = 126;

/// 7-bit length marker announcing a 64-bit extended length
const LEN_MARKER_64: u8 = 127;

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation frame (recognized, never accepted)
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Connection close
    Close = 0x8,
}

impl OpCode {
    /// Parse opcode from the low nibble of the first header byte
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x8 => Some(OpCode::Close),
            _ => None,
        }
    }
}

/// How the payload length continues after the base header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLength {
    /// Length fits the 7-bit field (0..=125)
    Short(u8),
    /// Next 2 bytes hold a big-endian length
    Extended16,
    /// Next 8 bytes hold a big-endian length
    Extended64,
}

impl PayloadLength {
    /// Classify the 7-bit length field
    #[inline]
    pub fn from_u7(len_byte: u8) -> Self {
        match len_byte & 0x7F {
            LEN_MARKER_16 => PayloadLength::Extended16,
            LEN_MARKER_64 => PayloadLength::Extended64,
            n => PayloadLength::Short(n),
        }
    }
}

/// Result of decoding the 2-byte base header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseHeader {
    /// Peer requested close; nothing past the base header is read
    Close,
    /// Text frame whose length and mask still have to be read
    Text {
        /// MASK bit
        masked: bool,
        /// Length encoding announced by the 7-bit field
        length: PayloadLength,
    },
}

impl BaseHeader {
    /// Decode FIN, RSV1-3, opcode, MASK and the 7-bit length field
    ///
    /// The first nibble must be exactly `0b1000`. A clear FIN with clear
    /// reserved bits is an unsupported fragment; any reserved bit set is
    /// rejected as well. Only text and close opcodes are accepted.
    pub fn parse(bytes: [u8; 2]) -> Result<Self> {
        let [b0, b1] = bytes;

        match b0 >> 4 {
            FIN_ONLY => {}
            0b0000 => {
                return Err(Error::ProtocolViolation(
                    "fragmented messages are not supported",
                ));
            }
            _ => return Err(Error::ProtocolViolation("RSV1, RSV2 and RSV3 must be 0")),
        }

        let opcode = OpCode::from_u8(b0 & 0x0F).ok_or(Error::ProtocolViolation("unknown opcode"))?;

        match opcode {
            OpCode::Close => Ok(BaseHeader::Close),
            OpCode::Continuation => Err(Error::ProtocolViolation(
                "continuation frames are not supported",
            )),
            OpCode::Text => Ok(BaseHeader::Text {
                masked: b1 & 0x80 != 0,
                length: PayloadLength::from_u7(b1),
            }),
        }
    }
}

/// A fully resolved frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag
    pub fin: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Mask flag
    pub masked: bool,
    /// Payload length
    pub payload_len: u64,
    /// Masking key (present iff masked)
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Header for an unmasked, final frame
    pub fn new(opcode: OpCode, payload_len: u64) -> Self {
        Self {
            fin: true,
            opcode,
            masked: false,
            payload_len,
            mask: None,
        }
    }

    /// Get the total header size in bytes
    #[inline]
    pub fn header_size(&self) -> usize {
        let mut size = 2;

        if self.payload_len > MEDIUM_MESSAGE_THRESHOLD as u64 {
            size += 8;
        } else if self.payload_len > SMALL_MESSAGE_THRESHOLD as u64 {
            size += 2;
        }

        if self.masked {
            size += 4;
        }

        size
    }

    /// Encode the frame header into a buffer
    ///
    /// The length uses the shortest of the three encodings.
    #[inline]
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut b0 = self.opcode as u8;
        if self.fin {
            b0 |= 0x80;
        }
        buf.put_u8(b0);

        let mask_bit = if self.masked { 0x80 } else { 0x00 };

        if self.payload_len <= SMALL_MESSAGE_THRESHOLD as u64 {
            buf.put_u8(mask_bit | self.payload_len as u8);
        } else if self.payload_len <= MEDIUM_MESSAGE_THRESHOLD as u64 {
            buf.put_u8(mask_bit | LEN_MARKER_16);
            buf.put_u16(self.payload_len as u16);
        } else {
            buf.put_u8(mask_bit | LEN_MARKER_64);
            buf.put_u64(self.payload_len);
        }

        if let Some(mask) = self.mask {
            buf.put_slice(&mask);
        }
    }
}

/// Encode a complete, final frame into a buffer
///
/// With `mask = None` this is the server encoding: no mask bit, no key.
/// With a mask the payload is copied and masked, as a client would send it.
pub fn encode_frame_into(
    buf: &mut BytesMut,
    opcode: OpCode,
    payload: &[u8],
    mask: Option<[u8; 4]>,
) {
    let header = FrameHeader {
        masked: mask.is_some(),
        mask,
        ..FrameHeader::new(opcode, payload.len() as u64)
    };

    buf.reserve(header.header_size() + payload.len());
    header.encode(buf);

    let start = buf.len();
    buf.put_slice(payload);
    if let Some(m) = mask {
        apply_mask(&mut buf[start..], m);
    }
}
