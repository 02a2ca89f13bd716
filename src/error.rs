//! Error types for tribolink operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::MessageKind;

/// Main error type for all tribolink operations.
#[derive(Debug, Error)]
pub enum TriboError {
    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a frame.
    #[error("truncated frame: need {expected} bytes, got {got}")]
    TruncatedFrame { expected: usize, got: usize },

    /// A header announced a payload above the decode cap.
    #[error("frame too large: payload of {len} bytes exceeds the {max} byte cap")]
    FrameTooLarge { len: u32, max: u32 },

    /// The first frame of a session was not READY.
    #[error("handshake failed: expected READY (1), received message type {received}")]
    HandshakeFailed { received: u32 },

    /// The instrument reported a fault (ERROR message); the batch aborts.
    #[error("instrument fault: {0}")]
    InstrumentFault(String),

    /// A receive step got a message type outside its declared set.
    #[error("protocol violation during {phase}: received message type {received}, expected one of {expected:?}")]
    ProtocolViolation {
        phase: &'static str,
        received: u32,
        expected: &'static [MessageKind],
    },

    /// A time-bounded receive expired before a full frame arrived.
    #[error("receive timed out after {0:?}")]
    Timeout(Duration),

    /// The per-point result file was missing, incomplete, or unparseable.
    #[error("malformed result file {file}: {detail}", file = .path.display())]
    MalformedResultFile { path: PathBuf, detail: String },

    /// A target-point line could not be parsed.
    #[error("malformed point list at line {line}: {detail}")]
    MalformedPointList { line: usize, detail: String },
}

/// Result type alias using TriboError.
pub type Result<T> = std::result::Result<T, TriboError>;
