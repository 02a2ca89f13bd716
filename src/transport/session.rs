//! Frame-level session over one persistent byte stream.
//!
//! A [`Session`] exclusively owns a live connection and exchanges whole
//! frames on it: sends encode-and-flush in one call, receives complete
//! when a full frame has arrived. The protocol is strictly alternating
//! (at most one frame in flight per direction), so there is no reader
//! task, no write queue, and no frame reordering to worry about.
//!
//! The session is generic over the stream type; production code runs it
//! over [`TcpStream`] via [`connect`], tests run it over
//! `tokio::io::duplex` pipes.
//!
//! # Example
//!
//! ```ignore
//! use tribolink::transport::connect;
//! use tribolink::protocol::MessageKind;
//!
//! let mut session = connect("127.0.0.1", 10005).await?;
//! let ready = session.recv().await?;
//! session.send(MessageKind::RequestStatus, "Query Status").await?;
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, trace};

use crate::error::{Result, TriboError};
use crate::protocol::{encode_frame, role, Frame, Header, MessageKind, HEADER_SIZE};

/// Host both reference endpoints assume.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Well-known port the instrument listens on.
pub const DEFAULT_PORT: u16 = 10005;

/// One endpoint's view of the persistent connection.
#[derive(Debug)]
pub struct Session<S> {
    stream: S,
    origin: u32,
    recv_timeout: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    /// Wrap a connected stream.
    ///
    /// Outgoing headers are stamped with [`role::REQUEST`], matching
    /// both reference endpoints (replies included).
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            origin: role::REQUEST,
            recv_timeout: None,
        }
    }

    /// Bound every receive by `timeout`; `None` waits forever.
    ///
    /// The reference protocol has no timeout, so unbounded waiting is
    /// the default. An expired receive fails with
    /// [`TriboError::Timeout`] and the session should be discarded (the
    /// frame that eventually arrives would be misaligned with the
    /// workflow state).
    pub fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.recv_timeout = timeout;
    }

    /// Builder-style variant of [`set_recv_timeout`].
    ///
    /// [`set_recv_timeout`]: Session::set_recv_timeout
    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Encode one catalog message and write it out, flushing before
    /// returning.
    pub async fn send(&mut self, kind: MessageKind, payload: &str) -> Result<()> {
        trace!(kind = %kind, len = payload.len(), "sending frame");
        self.send_raw(kind.wire_id(), payload).await
    }

    /// Send a frame with an arbitrary type identifier.
    ///
    /// Exists for driving counterpart implementations with off-catalog
    /// frames; normal traffic goes through [`send`](Session::send).
    pub async fn send_raw(&mut self, kind: u32, payload: &str) -> Result<()> {
        let bytes = encode_frame(self.origin, kind, payload);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Receive exactly one frame.
    ///
    /// Waits until a full frame is available, bounded by the configured
    /// receive timeout if one is set.
    ///
    /// # Errors
    ///
    /// - [`TriboError::ConnectionClosed`] if the peer closed between
    ///   frames
    /// - [`TriboError::TruncatedFrame`] if the stream ended mid-frame
    /// - [`TriboError::FrameTooLarge`] if the header announces a payload
    ///   above the decode cap
    /// - [`TriboError::Timeout`] if the receive bound expired
    pub async fn recv(&mut self) -> Result<Frame> {
        let limit = self.recv_timeout;
        match limit {
            Some(limit) => match time::timeout(limit, self.read_frame()).await {
                Ok(result) => result,
                Err(_) => Err(TriboError::Timeout(limit)),
            },
            None => self.read_frame().await,
        }
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        let mut head = [0u8; HEADER_SIZE];
        self.fill(&mut head, true).await?;
        let header = Header::from_bytes(&head);
        header.validate()?;

        let mut body = vec![0u8; header.payload_len as usize];
        if !body.is_empty() {
            self.fill(&mut body, false).await?;
        }

        // Reference decoders replace invalid UTF-8 rather than failing.
        let payload = String::from_utf8_lossy(&body).into_owned();
        trace!(kind = header.kind, len = header.payload_len, "received frame");
        Ok(Frame::from_parts(header, payload))
    }

    /// Read until `buf` is full. EOF before the first byte of a header
    /// is a clean close; EOF anywhere else leaves a torn frame.
    async fn fill(&mut self, buf: &mut [u8], at_frame_start: bool) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(if at_frame_start && filled == 0 {
                    TriboError::ConnectionClosed
                } else {
                    TriboError::TruncatedFrame {
                        expected: buf.len(),
                        got: filled,
                    }
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Open the controller-side TCP session to a listening instrument.
///
/// Disables Nagle buffering so each frame is handed to the network as
/// soon as it is written; the protocol's alternation makes batching
/// counterproductive.
pub async fn connect(host: &str, port: u16) -> Result<Session<TcpStream>> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    debug!(host, port, "connected to instrument");
    Ok(Session::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_PAYLOAD_LEN;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_send_recv_round_trip() {
        let (a, b) = duplex(256);
        let mut sender = Session::new(a);
        let mut receiver = Session::new(b);

        sender
            .send(MessageKind::SampleLoaded, "Sample In Position")
            .await
            .unwrap();
        let frame = receiver.recv().await.unwrap();

        assert_eq!(frame.message_kind(), Some(MessageKind::SampleLoaded));
        assert_eq!(frame.payload(), "Sample In Position");
        assert_eq!(frame.role(), role::REQUEST);
        assert_eq!(frame.payload_len(), 18);
    }

    #[tokio::test]
    async fn test_recv_preserves_unknown_kind() {
        let (a, b) = duplex(256);
        let mut sender = Session::new(a);
        let mut receiver = Session::new(b);

        sender.send_raw(99, "mystery").await.unwrap();
        let frame = receiver.recv().await.unwrap();

        assert_eq!(frame.kind(), 99);
        assert_eq!(frame.message_kind(), None);
        assert_eq!(frame.payload(), "mystery");
    }

    #[tokio::test]
    async fn test_empty_payload_frame() {
        let (a, b) = duplex(64);
        let mut sender = Session::new(a);
        let mut receiver = Session::new(b);

        sender.send(MessageKind::Ready, "").await.unwrap();
        let frame = receiver.recv().await.unwrap();

        assert_eq!(frame.message_kind(), Some(MessageKind::Ready));
        assert_eq!(frame.payload(), "");
    }

    #[tokio::test]
    async fn test_clean_close_is_connection_closed() {
        let (a, b) = duplex(64);
        drop(a);
        let mut receiver = Session::new(b);

        let err = receiver.recv().await.unwrap_err();
        assert!(matches!(err, TriboError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_partial_header_is_truncated_frame() {
        let (mut a, b) = duplex(64);
        a.write_all(&[1, 0, 0, 0, 11]).await.unwrap();
        drop(a);
        let mut receiver = Session::new(b);

        let err = receiver.recv().await.unwrap_err();
        assert!(matches!(
            err,
            TriboError::TruncatedFrame {
                expected: HEADER_SIZE,
                got: 5
            }
        ));
    }

    #[tokio::test]
    async fn test_partial_payload_is_truncated_frame() {
        let (mut a, b) = duplex(64);
        // Header announces 10 payload bytes, only 4 follow.
        a.write_all(&Header::new(role::REQUEST, 4, 10).encode())
            .await
            .unwrap();
        a.write_all(b"TS_B").await.unwrap();
        drop(a);
        let mut receiver = Session::new(b);

        let err = receiver.recv().await.unwrap_err();
        assert!(matches!(
            err,
            TriboError::TruncatedFrame {
                expected: 10,
                got: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_is_rejected() {
        let (mut a, b) = duplex(64);
        a.write_all(&Header::new(role::REQUEST, 4, MAX_PAYLOAD_LEN + 1).encode())
            .await
            .unwrap();
        let mut receiver = Session::new(b);

        let err = receiver.recv().await.unwrap_err();
        assert!(matches!(err, TriboError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_recv_timeout_fires() {
        let (_a, b) = duplex(64);
        let mut receiver =
            Session::new(b).with_recv_timeout(Some(Duration::from_millis(20)));

        let err = receiver.recv().await.unwrap_err();
        assert!(matches!(err, TriboError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_payload_is_replaced() {
        let (mut a, b) = duplex(64);
        a.write_all(&Header::new(role::REQUEST, 1, 2).encode())
            .await
            .unwrap();
        a.write_all(&[0xFF, 0xFE]).await.unwrap();
        let mut receiver = Session::new(b);

        let frame = receiver.recv().await.unwrap();
        assert_eq!(frame.kind(), 1);
        assert!(frame.payload().chars().all(|c| c == '\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_fragmented_frame_reassembles() {
        let (mut a, b) = duplex(64);
        let bytes = encode_frame(role::REQUEST, 22, "Moving");
        let (first, rest) = bytes.split_at(7);
        a.write_all(first).await.unwrap();
        a.flush().await.unwrap();

        let reader = tokio::spawn(async move {
            let mut receiver = Session::new(b);
            receiver.recv().await
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        a.write_all(rest).await.unwrap();
        a.flush().await.unwrap();

        let frame = reader.await.unwrap().unwrap();
        assert_eq!(frame.message_kind(), Some(MessageKind::JobExecStatus));
        assert_eq!(frame.payload(), "Moving");
    }
}
