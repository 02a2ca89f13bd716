//! Instrument responder: the counterpart state machine a tester (or its
//! stand-in) runs to answer a controller.
//!
//! The responder is reactive. It sends READY once on startup and from
//! then on only replies to what it receives:
//!
//! ```text
//! SAMPLE_LOADED  -> APPROACH_STATUS
//! MOVE_XY        -> JOB_EXEC_STATUS, then a settle delay
//! METHOD_ID      -> (no reply) arm a new test
//! REQUEST_STATUS -> BUSY while the test runs, then OPERATION_COMPLETED
//! ```
//!
//! Completion publishes a [`Measurement`] through the configured
//! [`ResultSink`] before the completion reply goes out, so the result
//! is already in place when the controller learns the point is done.
//! The serve loop ends cleanly when the controller disconnects.

use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{Result, TriboError};
use crate::protocol::{Frame, MessageKind};
use crate::results::{Measurement, ResultSink};
use crate::transport::Session;

/// Busy replies served before a test is reported complete.
pub const DEFAULT_BUSY_POLLS: u32 = 3;

/// Simulated stage settle time after a move.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

const READY_BANNER: &str = "Triboscan in Loading Position";
const APPROACH_REPLY: &str = "Quick approach started";
const BUSY_REPLY: &str = "TS_BUSY: Indenting...";
const MOVING_REPLY: &str = "TS_JOB_EXEC_STATUS: Moving Stages...";
const COMPLETED_REPLY: &str = "All operations completed";

/// Test name reported when a status poll completes without a prior
/// METHOD_ID on this session.
const DEFAULT_TEST_NAME: &str = "Batch_Point";

/// Tunables for the responder.
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    /// How many BUSY replies each test serves before completing.
    pub busy_polls: u32,
    /// Simulated stage motion time after MOVE_XY.
    pub settle_delay: Duration,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            busy_polls: DEFAULT_BUSY_POLLS,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Responder driving one session from READY to disconnect.
///
/// # Example
///
/// ```no_run
/// use tribolink::{FileResultSink, Instrument, Session};
/// use tokio::net::TcpListener;
///
/// # async fn demo() -> tribolink::Result<()> {
/// let listener = TcpListener::bind(("0.0.0.0", 10005)).await?;
/// let (stream, _) = listener.accept().await?;
/// let sink = FileResultSink::new("Result_Batch_Point.txt");
/// Instrument::new(Session::new(stream), sink).serve().await?;
/// # Ok(())
/// # }
/// ```
pub struct Instrument<S, K> {
    session: Session<S>,
    config: InstrumentConfig,
    sink: K,
    /// Status polls answered BUSY since the last METHOD_ID.
    busy_count: u32,
    /// Method name of the test in progress, if one was dispatched.
    active_method: Option<String>,
}

impl<S, K> Instrument<S, K>
where
    S: AsyncRead + AsyncWrite + Unpin,
    K: ResultSink,
{
    pub fn new(session: Session<S>, sink: K) -> Self {
        Self::with_config(session, sink, InstrumentConfig::default())
    }

    pub fn with_config(session: Session<S>, sink: K, config: InstrumentConfig) -> Self {
        Self {
            session,
            config,
            sink,
            busy_count: 0,
            active_method: None,
        }
    }

    /// Announce readiness, then answer the controller until it
    /// disconnects.
    ///
    /// # Errors
    ///
    /// Returns any transport error other than a clean disconnect, and
    /// any failure publishing a finished measurement to the sink.
    pub async fn serve(mut self) -> Result<()> {
        self.session.send(MessageKind::Ready, READY_BANNER).await?;

        loop {
            let frame = match self.session.recv().await {
                Ok(frame) => frame,
                Err(TriboError::ConnectionClosed) => {
                    debug!("controller disconnected, session over");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            self.dispatch(frame).await?;
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<()> {
        match frame.message_kind() {
            Some(MessageKind::SampleLoaded) => {
                debug!(payload = %frame.payload(), "sample confirmed, starting approach");
                self.session
                    .send(MessageKind::ApproachStatus, APPROACH_REPLY)
                    .await?;
            }
            Some(MessageKind::MoveXy) => {
                debug!(target = %frame.payload(), "moving stages");
                self.session
                    .send(MessageKind::JobExecStatus, MOVING_REPLY)
                    .await?;
                tokio::time::sleep(self.config.settle_delay).await;
            }
            Some(MessageKind::MethodId) => {
                debug!(method = %frame.payload(), "test dispatched");
                self.busy_count = 0;
                self.active_method = Some(frame.into_payload());
            }
            Some(MessageKind::RequestStatus) => self.report_status().await?,
            Some(MessageKind::OperationCompleted) => {
                info!("controller reported the batch complete");
            }
            Some(other) => {
                warn!(kind = %other, "ignoring unexpected message");
            }
            None => {
                warn!(kind = frame.kind(), "ignoring unknown message type");
            }
        }
        Ok(())
    }

    /// Answer one REQUEST_STATUS: BUSY until the configured number of
    /// polls has been served, then publish the measurement and reply
    /// OPERATION_COMPLETED.
    async fn report_status(&mut self) -> Result<()> {
        if self.busy_count < self.config.busy_polls {
            self.busy_count += 1;
            debug!(poll = self.busy_count, "still indenting");
            self.session.send(MessageKind::Busy, BUSY_REPLY).await?;
            return Ok(());
        }

        let measurement = self.finish_measurement();
        info!(
            test = %measurement.test_name,
            hardness = measurement.hardness,
            modulus = measurement.modulus,
            "test finished",
        );
        self.sink.publish(&measurement)?;
        self.session
            .send(MessageKind::OperationCompleted, COMPLETED_REPLY)
            .await?;
        self.busy_count = 0;
        Ok(())
    }

    fn finish_measurement(&mut self) -> Measurement {
        let mut rng = rand::thread_rng();
        Measurement {
            test_name: self
                .active_method
                .take()
                .unwrap_or_else(|| DEFAULT_TEST_NAME.to_string()),
            hardness: rng.gen_range(10.0..12.0),
            modulus: rng.gen_range(150.0..160.0),
        }
    }
}
