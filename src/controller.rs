//! Controller workflow: the state machine that drives an instrument
//! through a batch of indentation tests.
//!
//! One run walks this sequence over a single session:
//!
//! ```text
//! AwaitHandshake
//!   |  READY
//!   v
//! per point:  MOVE_XY        -> JOB_EXEC_STATUS, then settle
//!             SAMPLE_LOADED  -> APPROACH_STATUS
//!             METHOD_ID         (no reply)
//!             REQUEST_STATUS -> BUSY ... until OPERATION_COMPLETED
//!   |
//!   v
//! Finalize:   OPERATION_COMPLETED sent to mark the batch done
//! ```
//!
//! Every receive declares the message kinds it may legally see; any
//! other kind fails the run with
//! [`ProtocolViolation`](crate::TriboError::ProtocolViolation) instead
//! of being consumed silently. An ERROR reply during polling aborts
//! the whole batch. Either way, points completed before the abort stay
//! in the returned [`BatchReport`].

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{Result, TriboError};
use crate::points::TargetPoint;
use crate::protocol::{Frame, MessageKind};
use crate::results::{PointResult, ResultSource};
use crate::transport::Session;

/// Pause after a stage move before the sample is confirmed.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Pause before each status poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Prefix for generated per-point method names.
pub const DEFAULT_METHOD_PREFIX: &str = "Batch_Test_Point_";

const SAMPLE_LOADED_TEXT: &str = "Sample In Position";
const STATUS_QUERY_TEXT: &str = "Query Status";
const BATCH_COMPLETE_TEXT: &str = "All Batch Jobs Completed";

const MOVE_ACK_EXPECTED: &[MessageKind] = &[MessageKind::JobExecStatus];
const APPROACH_EXPECTED: &[MessageKind] = &[MessageKind::ApproachStatus];
const POLL_EXPECTED: &[MessageKind] = &[
    MessageKind::Busy,
    MessageKind::OperationCompleted,
    MessageKind::Error,
];

/// Tunables for one batch run.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Stage settle time after a move acknowledgment.
    pub settle_delay: Duration,
    /// Delay before each status poll.
    pub poll_interval: Duration,
    /// Upper bound on each receive; `None` waits indefinitely.
    pub recv_timeout: Option<Duration>,
    /// Method-name prefix; the first point is dispatched as e.g.
    /// `Batch_Test_Point_1`.
    pub method_prefix: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            recv_timeout: None,
            method_prefix: DEFAULT_METHOD_PREFIX.to_string(),
        }
    }
}

/// Outcome of one batch run.
///
/// Always produced, even when the run aborts partway: `results` holds
/// whatever completed before the failure.
#[derive(Debug)]
pub struct BatchReport {
    /// Completed points with their measurements, in visit order.
    pub results: Vec<PointResult>,
    /// Points whose test completed but whose measurement could not be
    /// read. The batch continues past these.
    pub skipped: Vec<SkippedPoint>,
    /// How the run ended.
    pub status: BatchStatus,
}

impl BatchReport {
    /// True when every point was visited and the batch-complete signal
    /// went out.
    pub fn is_complete(&self) -> bool {
        matches!(self.status, BatchStatus::Completed)
    }
}

/// Terminal state of a batch run.
#[derive(Debug)]
pub enum BatchStatus {
    Completed,
    /// The run stopped early. Remaining points were never dispatched.
    Aborted(TriboError),
}

/// A point whose test finished but yielded no usable measurement.
#[derive(Debug)]
pub struct SkippedPoint {
    /// Zero-based index into the point list.
    pub index: usize,
    pub point: TargetPoint,
    pub reason: String,
}

/// Workflow engine driving one batch over an established session.
///
/// A `Controller` performs exactly one run: handshake, the per-point
/// sub-protocol for each target, then the batch-complete signal. It
/// consumes itself in [`run`](Controller::run) and always returns a
/// [`BatchReport`]; the connection is released on every exit path when
/// the controller is dropped.
///
/// # Example
///
/// ```no_run
/// use tribolink::{connect, Controller, FileResultSource, TargetPoint};
///
/// # async fn demo() -> tribolink::Result<()> {
/// let session = connect("127.0.0.1", 10005).await?;
/// let points = vec![TargetPoint::new(10.0, 10.5), TargetPoint::new(12.0, 10.5)];
/// let mut source = FileResultSource::new("Result_Batch_Point.txt");
/// let report = Controller::new(session).run(&points, &mut source).await;
/// println!("{} points completed", report.results.len());
/// # Ok(())
/// # }
/// ```
pub struct Controller<S> {
    session: Session<S>,
    config: ControllerConfig,
}

impl<S> Controller<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(session: Session<S>) -> Self {
        Self::with_config(session, ControllerConfig::default())
    }

    pub fn with_config(mut session: Session<S>, config: ControllerConfig) -> Self {
        session.set_recv_timeout(config.recv_timeout);
        Self { session, config }
    }

    /// Drive the whole batch and report how it went.
    ///
    /// Visits `points` in order, consulting `source` once per completed
    /// point. Never returns an error directly: failures end up in the
    /// report's [`status`](BatchReport::status) alongside the results
    /// collected before the abort.
    pub async fn run<R>(mut self, points: &[TargetPoint], source: &mut R) -> BatchReport
    where
        R: ResultSource,
    {
        let mut results = Vec::new();
        let mut skipped = Vec::new();
        let status = match self
            .drive(points, source, &mut results, &mut skipped)
            .await
        {
            Ok(()) => BatchStatus::Completed,
            Err(err) => {
                warn!(error = %err, completed = results.len(), "batch aborted");
                BatchStatus::Aborted(err)
            }
        };
        BatchReport {
            results,
            skipped,
            status,
        }
    }

    async fn drive<R>(
        &mut self,
        points: &[TargetPoint],
        source: &mut R,
        results: &mut Vec<PointResult>,
        skipped: &mut Vec<SkippedPoint>,
    ) -> Result<()>
    where
        R: ResultSource,
    {
        self.await_handshake().await?;

        for (index, point) in points.iter().copied().enumerate() {
            info!(
                point = index + 1,
                total = points.len(),
                x = point.x,
                y = point.y,
                "testing point",
            );
            self.move_stage(point).await?;
            self.confirm_sample().await?;
            self.dispatch_method(index).await?;
            self.poll_until_complete().await?;

            // A missing or unreadable measurement is contained to this
            // point; the batch moves on.
            match source.take() {
                Ok(measurement) => results.push(PointResult::new(measurement, point)),
                Err(err) => {
                    warn!(point = index + 1, error = %err, "no measurement for completed point");
                    skipped.push(SkippedPoint {
                        index,
                        point,
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.finish_batch().await
    }

    /// Block until the instrument announces itself. Anything but READY
    /// is fatal; the per-point loop never starts.
    async fn await_handshake(&mut self) -> Result<()> {
        let frame = self.session.recv().await?;
        if frame.message_kind() != Some(MessageKind::Ready) {
            return Err(TriboError::HandshakeFailed {
                received: frame.kind(),
            });
        }
        info!(banner = %frame.payload(), "instrument ready");
        Ok(())
    }

    async fn move_stage(&mut self, point: TargetPoint) -> Result<()> {
        self.session
            .send(MessageKind::MoveXy, &point.coordinate_payload())
            .await?;
        let ack = self.expect_reply("stage move", MOVE_ACK_EXPECTED).await?;
        debug!(status = %ack.payload(), "stage motion acknowledged");
        tokio::time::sleep(self.config.settle_delay).await;
        Ok(())
    }

    async fn confirm_sample(&mut self) -> Result<()> {
        self.session
            .send(MessageKind::SampleLoaded, SAMPLE_LOADED_TEXT)
            .await?;
        // The approach notice is consumed to keep the exchange
        // alternating; its text is not acted on.
        let notice = self
            .expect_reply("sample confirmation", APPROACH_EXPECTED)
            .await?;
        debug!(status = %notice.payload(), "approach started");
        Ok(())
    }

    /// Name and dispatch the test for the point at `index`. The
    /// instrument starts working without a synchronous reply.
    async fn dispatch_method(&mut self, index: usize) -> Result<()> {
        let method = format!("{}{}", self.config.method_prefix, index + 1);
        debug!(%method, "dispatching test");
        self.session.send(MessageKind::MethodId, &method).await?;
        Ok(())
    }

    /// Poll status until the instrument reports the point done.
    ///
    /// BUSY keeps polling. ERROR aborts the whole batch, not just this
    /// point.
    async fn poll_until_complete(&mut self) -> Result<()> {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            self.session
                .send(MessageKind::RequestStatus, STATUS_QUERY_TEXT)
                .await?;
            let reply = self.expect_reply("status poll", POLL_EXPECTED).await?;
            match reply.message_kind() {
                Some(MessageKind::OperationCompleted) => {
                    debug!(status = %reply.payload(), "point completed");
                    return Ok(());
                }
                Some(MessageKind::Error) => {
                    return Err(TriboError::InstrumentFault(reply.into_payload()));
                }
                _ => debug!(status = %reply.payload(), "instrument busy"),
            }
        }
    }

    async fn finish_batch(&mut self) -> Result<()> {
        self.session
            .send(MessageKind::OperationCompleted, BATCH_COMPLETE_TEXT)
            .await?;
        info!("batch complete");
        Ok(())
    }

    /// Receive one frame and check it against the kinds this phase may
    /// legally see.
    async fn expect_reply(
        &mut self,
        phase: &'static str,
        expected: &'static [MessageKind],
    ) -> Result<Frame> {
        let frame = self.session.recv().await?;
        let allowed = frame
            .message_kind()
            .is_some_and(|kind| expected.contains(&kind));
        if !allowed {
            return Err(TriboError::ProtocolViolation {
                phase,
                received: frame.kind(),
                expected,
            });
        }
        Ok(frame)
    }
}
