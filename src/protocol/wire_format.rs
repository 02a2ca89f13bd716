//! Wire format encoding and decoding.
//!
//! Implements the 12-byte header format shared by both endpoints:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬────────────────┐
//! │ Role     │ Type     │ Length   │ Payload        │
//! │ 4 bytes  │ 4 bytes  │ 4 bytes  │ `Length` bytes │
//! │ u32 LE   │ u32 LE   │ u32 LE   │ UTF-8 text     │
//! └──────────┴──────────┴──────────┴────────────────┘
//! ```
//!
//! All header integers are Little Endian. There is no checksum, version
//! field, or magic number; framing integrity rests on the length field
//! alone.

use bytes::{Buf, BufMut};

use crate::error::{Result, TriboError};

/// Header size in bytes (fixed, exactly 12).
pub const HEADER_SIZE: usize = 12;

/// Maximum payload length accepted on decode (16 MiB).
///
/// Encode places no limit beyond the integer width; the cap guards the
/// receive path against corrupt headers demanding absurd allocations.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Role constants for the first header field.
///
/// The role tag is informational: it round-trips through the codec but is
/// never used for dispatch. Both reference endpoints stamp [`REQUEST`]
/// on everything they send, replies included, so [`RESPONSE`] is defined
/// for completeness rather than because it appears on the wire.
///
/// [`REQUEST`]: role::REQUEST
/// [`RESPONSE`]: role::RESPONSE
pub mod role {
    /// Written by the side initiating an exchange.
    pub const REQUEST: u32 = 1;
    /// Written by the side acknowledging a read.
    pub const RESPONSE: u32 = 2;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Role tag (see [`role`]).
    pub role: u32,
    /// Message type identifier (see the message catalog).
    pub kind: u32,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(role: u32, kind: u32, payload_len: u32) -> Self {
        Self {
            role,
            kind,
            payload_len,
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use tribolink::protocol::{role, Header};
    ///
    /// let header = Header::new(role::REQUEST, 11, 12);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 12);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf.as_mut_slice());
        buf
    }

    /// Encode header into any writable buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has fewer than [`HEADER_SIZE`] bytes of
    /// capacity remaining.
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.role);
        buf.put_u32_le(self.kind);
        buf.put_u32_le(self.payload_len);
    }

    /// Decode a header from exactly [`HEADER_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut cursor = &bytes[..];
        Self {
            role: cursor.get_u32_le(),
            kind: cursor.get_u32_le(),
            payload_len: cursor.get_u32_le(),
        }
    }

    /// Decode a header from the front of a byte slice (Little Endian).
    ///
    /// Returns `None` if the slice is shorter than [`HEADER_SIZE`].
    ///
    /// # Example
    ///
    /// ```
    /// use tribolink::protocol::Header;
    ///
    /// let bytes = [1, 0, 0, 0, 11, 0, 0, 0, 5, 0, 0, 0];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.role, 1);
    /// assert_eq!(header.kind, 11);
    /// assert_eq!(header.payload_len, 5);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let bytes: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    /// Validate the header before the payload is read.
    ///
    /// Rejects payload lengths above [`MAX_PAYLOAD_LEN`]; everything else
    /// is accepted, including message types outside the catalog (those
    /// surface later, at the receive step that expected something
    /// specific).
    pub fn validate(&self) -> Result<()> {
        if self.payload_len > MAX_PAYLOAD_LEN {
            return Err(TriboError::FrameTooLarge {
                len: self.payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(())
    }
}
