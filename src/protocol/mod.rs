//! Protocol module - wire format, framing, and the message catalog.
//!
//! This module implements the binary message layer shared by both
//! endpoints:
//! - 12-byte little-endian header encoding/decoding
//! - Frame struct with typed accessors
//! - The closed catalog of message types and their contracts

mod catalog;
mod frame;
mod wire_format;

pub use catalog::{MessageKind, PayloadShape, Sender, CATALOG};
pub use frame::{encode_frame, Frame};
pub use wire_format::{role, Header, HEADER_SIZE, MAX_PAYLOAD_LEN};
