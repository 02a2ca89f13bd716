//! Transport module - the frame-level connection session.
//!
//! Provides:
//! - [`Session`]: whole-frame send/receive over one owned stream
//! - [`connect`]: controller-side TCP setup with the reference defaults

mod session;

pub use session::{connect, Session, DEFAULT_HOST, DEFAULT_PORT};
