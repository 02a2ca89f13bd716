//! Frame struct with typed accessors.
//!
//! Represents one complete wire message: a decoded [`Header`] plus its
//! UTF-8 text payload. Payloads in this protocol are always text, so the
//! frame owns a `String` rather than raw bytes.
//!
//! # Example
//!
//! ```
//! use tribolink::protocol::{role, Frame, MessageKind};
//!
//! let frame = Frame::new(role::REQUEST, MessageKind::MoveXy.wire_id(), "10.0000:10.5000");
//! assert_eq!(frame.kind(), 10);
//! assert_eq!(frame.message_kind(), Some(MessageKind::MoveXy));
//! assert_eq!(frame.payload(), "10.0000:10.5000");
//! ```

use super::catalog::MessageKind;
use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload text.
    pub payload: String,
}

impl Frame {
    /// Create a new frame, deriving the header length from the payload.
    pub fn new(role: u32, kind: u32, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        Self {
            header: Header::new(role, kind, payload.len() as u32),
            payload,
        }
    }

    /// Assemble a frame from a wire header and decoded payload text.
    ///
    /// The header is kept as received; its `payload_len` reflects the
    /// wire byte count, which only differs from `payload.len()` when
    /// invalid UTF-8 was replaced during decode.
    pub fn from_parts(header: Header, payload: String) -> Self {
        Self { header, payload }
    }

    /// Get the message type identifier.
    #[inline]
    pub fn kind(&self) -> u32 {
        self.header.kind
    }

    /// Get the role tag.
    #[inline]
    pub fn role(&self) -> u32 {
        self.header.role
    }

    /// Get the payload text.
    #[inline]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Get the payload length in bytes as announced on the wire.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.header.payload_len as usize
    }

    /// Resolve the type identifier against the message catalog.
    ///
    /// Returns `None` for identifiers outside the catalog; whether that
    /// is an error depends on what the receiving state expects.
    #[inline]
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_wire(self.header.kind)
    }

    /// Consume the frame, keeping only the payload text.
    #[inline]
    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// Encode a complete frame as a single byte vector.
///
/// Writes the 12-byte header followed by the UTF-8 payload bytes. The
/// length field is always the payload's UTF-8 byte count, not its
/// character count.
///
/// # Example
///
/// ```
/// use tribolink::protocol::{encode_frame, role, HEADER_SIZE};
///
/// let bytes = encode_frame(role::REQUEST, 2, "Sample In Position");
/// assert_eq!(bytes.len(), HEADER_SIZE + 18);
/// ```
pub fn encode_frame(role: u32, kind: u32, payload: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    Header::new(role, kind, payload.len() as u32).encode_into(&mut buf);
    buf.extend_from_slice(payload.as_bytes());
    buf
}
