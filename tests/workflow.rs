//! End-to-end workflow tests: a controller and an instrument, real or
//! scripted, talking over an in-memory duplex stream or a local TCP
//! socket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::DuplexStream;

use tribolink::results::REPORT_HEADER;
use tribolink::{
    connect, save_report, BatchStatus, Controller, ControllerConfig, FileResultSink,
    FileResultSource, Instrument, InstrumentConfig, Measurement, MessageKind, ResultSink,
    ResultSource, Session, TargetPoint, TriboError,
};

fn fast_controller() -> ControllerConfig {
    ControllerConfig {
        settle_delay: Duration::from_millis(1),
        poll_interval: Duration::from_millis(1),
        ..ControllerConfig::default()
    }
}

fn fast_instrument(busy_polls: u32) -> InstrumentConfig {
    InstrumentConfig {
        busy_polls,
        settle_delay: Duration::from_millis(1),
    }
}

/// In-memory stand-in for the result-file handoff between the roles.
#[derive(Clone, Default)]
struct MemoryHandoff {
    pending: Arc<Mutex<VecDeque<Measurement>>>,
}

impl ResultSink for MemoryHandoff {
    fn publish(&mut self, measurement: &Measurement) -> tribolink::Result<()> {
        self.pending.lock().unwrap().push_back(measurement.clone());
        Ok(())
    }
}

impl ResultSource for MemoryHandoff {
    fn take(&mut self) -> tribolink::Result<Measurement> {
        self.pending
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TriboError::MalformedResultFile {
                path: "<memory>".into(),
                detail: "no pending measurement".to_string(),
            })
    }
}

/// Source with a scripted outcome per point; `None` simulates a result
/// file that never appeared.
struct FlakySource {
    replies: VecDeque<Option<Measurement>>,
}

impl ResultSource for FlakySource {
    fn take(&mut self) -> tribolink::Result<Measurement> {
        match self.replies.pop_front().flatten() {
            Some(measurement) => Ok(measurement),
            None => Err(TriboError::MalformedResultFile {
                path: "<memory>".into(),
                detail: "result file never appeared".to_string(),
            }),
        }
    }
}

/// What the scripted peer does for one point's polling phase.
enum PollPlan {
    /// Reply BUSY this many times, then OPERATION_COMPLETED.
    CompleteAfter(u32),
    /// Reply BUSY this many times, then ERROR with this text.
    ErrorAfter(u32, &'static str),
}

/// Everything the scripted peer saw while playing instrument.
#[derive(Default)]
struct ScriptLog {
    move_payloads: Vec<String>,
    methods: Vec<String>,
    status_requests: u32,
}

/// Play the instrument side of the protocol by hand, one `PollPlan`
/// per expected point, asserting the controller's exact sequence.
async fn run_script(
    io: DuplexStream,
    plans: Vec<PollPlan>,
    mut handoff: MemoryHandoff,
) -> tribolink::Result<ScriptLog> {
    let mut session = Session::new(io);
    let mut log = ScriptLog::default();

    session
        .send(MessageKind::Ready, "Triboscan in Loading Position")
        .await?;

    for plan in plans {
        let frame = session.recv().await?;
        assert_eq!(frame.message_kind(), Some(MessageKind::MoveXy));
        log.move_payloads.push(frame.into_payload());
        session
            .send(MessageKind::JobExecStatus, "Moving Stages")
            .await?;

        let frame = session.recv().await?;
        assert_eq!(frame.message_kind(), Some(MessageKind::SampleLoaded));
        session
            .send(MessageKind::ApproachStatus, "Quick approach started")
            .await?;

        let frame = session.recv().await?;
        assert_eq!(frame.message_kind(), Some(MessageKind::MethodId));
        log.methods.push(frame.into_payload());

        let (busy_replies, fault) = match plan {
            PollPlan::CompleteAfter(n) => (n, None),
            PollPlan::ErrorAfter(n, text) => (n, Some(text)),
        };
        for _ in 0..busy_replies {
            let frame = session.recv().await?;
            assert_eq!(frame.message_kind(), Some(MessageKind::RequestStatus));
            log.status_requests += 1;
            session
                .send(MessageKind::Busy, "TS_BUSY: Indenting...")
                .await?;
        }

        let frame = session.recv().await?;
        assert_eq!(frame.message_kind(), Some(MessageKind::RequestStatus));
        log.status_requests += 1;
        match fault {
            Some(text) => {
                session.send(MessageKind::Error, text).await?;
                // The controller aborts here; nothing more to script.
                return Ok(log);
            }
            None => {
                handoff.publish(&Measurement {
                    test_name: log.methods.last().cloned().unwrap_or_default(),
                    hardness: 11.0,
                    modulus: 155.0,
                })?;
                session
                    .send(MessageKind::OperationCompleted, "All operations completed")
                    .await?;
            }
        }
    }

    let frame = session.recv().await?;
    assert_eq!(frame.message_kind(), Some(MessageKind::OperationCompleted));
    Ok(log)
}

/// A full three-point batch against the real responder, results
/// flowing through the in-memory handoff.
#[tokio::test]
async fn test_full_batch_against_instrument() {
    let handoff = MemoryHandoff::default();
    let (near, far) = tokio::io::duplex(4096);
    let server = tokio::spawn(
        Instrument::with_config(Session::new(far), handoff.clone(), fast_instrument(2)).serve(),
    );

    let points = vec![
        TargetPoint::new(0.0, 0.0),
        TargetPoint::new(1.0, 1.5),
        TargetPoint::new(2.0, 3.0),
    ];
    let mut source = handoff.clone();
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&points, &mut source)
        .await;

    assert!(report.is_complete());
    assert!(report.skipped.is_empty());

    let names: Vec<&str> = report
        .results
        .iter()
        .map(|r| r.test_name.as_str())
        .collect();
    assert_eq!(
        names,
        ["Batch_Test_Point_1", "Batch_Test_Point_2", "Batch_Test_Point_3"]
    );
    for (result, point) in report.results.iter().zip(&points) {
        assert_eq!(result.x, point.x);
        assert_eq!(result.y, point.y);
        assert!((10.0..12.0).contains(&result.hardness));
        assert!((150.0..160.0).contains(&result.modulus));
    }

    server.await.unwrap().unwrap();
}

/// N busy replies cost exactly N+1 status requests.
#[tokio::test]
async fn test_polling_sends_one_request_per_busy_reply_plus_one() {
    let handoff = MemoryHandoff::default();
    let (near, far) = tokio::io::duplex(4096);
    let script = tokio::spawn(run_script(
        far,
        vec![PollPlan::CompleteAfter(3)],
        handoff.clone(),
    ));

    let points = vec![TargetPoint::new(5.0, 5.0)];
    let mut source = handoff.clone();
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&points, &mut source)
        .await;

    assert!(report.is_complete());
    let log = script.await.unwrap().unwrap();
    assert_eq!(log.status_requests, 4);
}

/// An ERROR reply kills the whole batch: no results, no further moves.
#[tokio::test]
async fn test_error_aborts_the_whole_batch() {
    let handoff = MemoryHandoff::default();
    let (near, far) = tokio::io::duplex(4096);
    let script = tokio::spawn(run_script(
        far,
        vec![PollPlan::ErrorAfter(1, "TS_ERROR: Tip crashed")],
        handoff.clone(),
    ));

    let points = vec![
        TargetPoint::new(0.0, 0.0),
        TargetPoint::new(1.0, 1.0),
        TargetPoint::new(2.0, 2.0),
    ];
    let mut source = handoff.clone();
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&points, &mut source)
        .await;

    assert!(report.results.is_empty());
    match &report.status {
        BatchStatus::Aborted(TriboError::InstrumentFault(text)) => {
            assert_eq!(text, "TS_ERROR: Tip crashed");
        }
        other => panic!("unexpected status: {other:?}"),
    }

    let log = script.await.unwrap().unwrap();
    assert_eq!(log.move_payloads, ["0.0000:0.0000"]);
}

/// Results collected before a mid-batch abort survive in the report.
#[tokio::test]
async fn test_abort_keeps_earlier_results() {
    let handoff = MemoryHandoff::default();
    let (near, far) = tokio::io::duplex(4096);
    let script = tokio::spawn(run_script(
        far,
        vec![
            PollPlan::CompleteAfter(1),
            PollPlan::CompleteAfter(0),
            PollPlan::ErrorAfter(2, "TS_ERROR: Transducer overload"),
        ],
        handoff.clone(),
    ));

    let points = vec![
        TargetPoint::new(0.0, 0.0),
        TargetPoint::new(1.0, 1.0),
        TargetPoint::new(2.0, 2.0),
    ];
    let mut source = handoff.clone();
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&points, &mut source)
        .await;

    assert!(!report.is_complete());
    let names: Vec<&str> = report
        .results
        .iter()
        .map(|r| r.test_name.as_str())
        .collect();
    assert_eq!(names, ["Batch_Test_Point_1", "Batch_Test_Point_2"]);

    script.await.unwrap().unwrap();
}

/// Anything but READY as the first frame stops the run before any send.
#[tokio::test]
async fn test_wrong_first_frame_stops_the_run() {
    let (near, far) = tokio::io::duplex(4096);
    let peer = tokio::spawn(async move {
        let mut session = Session::new(far);
        session.send(MessageKind::Busy, "not ready").await.unwrap();
        // The controller must hang up without sending anything.
        let err = session.recv().await.unwrap_err();
        assert!(matches!(err, TriboError::ConnectionClosed));
    });

    let points = vec![TargetPoint::new(0.0, 0.0)];
    let mut source = MemoryHandoff::default();
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&points, &mut source)
        .await;

    assert!(report.results.is_empty());
    match report.status {
        BatchStatus::Aborted(TriboError::HandshakeFailed { received }) => {
            assert_eq!(received, MessageKind::Busy.wire_id());
        }
        other => panic!("unexpected status: {other:?}"),
    }

    peer.await.unwrap();
}

/// A reply outside the declared set for a phase fails the run loudly.
#[tokio::test]
async fn test_unexpected_reply_is_a_protocol_violation() {
    let (near, far) = tokio::io::duplex(4096);
    let peer = tokio::spawn(async move {
        let mut session = Session::new(far);
        session.send(MessageKind::Ready, "ready").await.unwrap();
        let frame = session.recv().await.unwrap();
        assert_eq!(frame.message_kind(), Some(MessageKind::MoveXy));
        // Approach notice where a motion ack belongs.
        session
            .send(MessageKind::ApproachStatus, "Quick approach started")
            .await
            .unwrap();
    });

    let points = vec![TargetPoint::new(0.0, 0.0)];
    let mut source = MemoryHandoff::default();
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&points, &mut source)
        .await;

    match report.status {
        BatchStatus::Aborted(TriboError::ProtocolViolation {
            phase, received, ..
        }) => {
            assert_eq!(phase, "stage move");
            assert_eq!(received, MessageKind::ApproachStatus.wire_id());
        }
        other => panic!("unexpected status: {other:?}"),
    }

    peer.await.unwrap();
}

/// Off-catalog type identifiers are violations too, not silent skips.
#[tokio::test]
async fn test_off_catalog_reply_is_a_protocol_violation() {
    let (near, far) = tokio::io::duplex(4096);
    let peer = tokio::spawn(async move {
        let mut session = Session::new(far);
        session.send(MessageKind::Ready, "ready").await.unwrap();
        let frame = session.recv().await.unwrap();
        assert_eq!(frame.message_kind(), Some(MessageKind::MoveXy));
        session.send_raw(99, "glitch").await.unwrap();
    });

    let points = vec![TargetPoint::new(0.0, 0.0)];
    let mut source = MemoryHandoff::default();
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&points, &mut source)
        .await;

    match report.status {
        BatchStatus::Aborted(TriboError::ProtocolViolation { received, .. }) => {
            assert_eq!(received, 99);
        }
        other => panic!("unexpected status: {other:?}"),
    }

    peer.await.unwrap();
}

/// With a receive timeout configured, a silent instrument fails the
/// phase instead of hanging the run forever.
#[tokio::test]
async fn test_silent_instrument_times_out() {
    let (near, far) = tokio::io::duplex(4096);
    let peer = tokio::spawn(async move {
        let mut session = Session::new(far);
        session.send(MessageKind::Ready, "ready").await.unwrap();
        // Swallow everything, never reply.
        while session.recv().await.is_ok() {}
    });

    let config = ControllerConfig {
        recv_timeout: Some(Duration::from_millis(50)),
        ..fast_controller()
    };
    let points = vec![TargetPoint::new(0.0, 0.0)];
    let mut source = MemoryHandoff::default();
    let report = Controller::with_config(Session::new(near), config)
        .run(&points, &mut source)
        .await;

    match report.status {
        BatchStatus::Aborted(TriboError::Timeout(limit)) => {
            assert_eq!(limit, Duration::from_millis(50));
        }
        other => panic!("unexpected status: {other:?}"),
    }

    peer.await.unwrap();
}

/// A point whose measurement cannot be read is skipped; the batch
/// still completes and the rest of the results are intact.
#[tokio::test]
async fn test_missing_measurement_skips_that_point_only() {
    struct DiscardSink;

    impl ResultSink for DiscardSink {
        fn publish(&mut self, _measurement: &Measurement) -> tribolink::Result<()> {
            Ok(())
        }
    }

    let (near, far) = tokio::io::duplex(4096);
    let server = tokio::spawn(
        Instrument::with_config(Session::new(far), DiscardSink, fast_instrument(1)).serve(),
    );

    let canned = |name: &str| Measurement {
        test_name: name.to_string(),
        hardness: 11.0,
        modulus: 155.0,
    };
    let mut source = FlakySource {
        replies: VecDeque::from([
            Some(canned("Batch_Test_Point_1")),
            None,
            Some(canned("Batch_Test_Point_3")),
        ]),
    };

    let points = vec![
        TargetPoint::new(0.0, 0.0),
        TargetPoint::new(1.0, 1.0),
        TargetPoint::new(2.0, 2.0),
    ];
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&points, &mut source)
        .await;

    assert!(report.is_complete());
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 1);
    assert_eq!(report.skipped[0].point, TargetPoint::new(1.0, 1.0));
    assert!(report.skipped[0].reason.contains("never appeared"));

    server.await.unwrap().unwrap();
}

/// An empty point list still handshakes and sends the batch-complete
/// signal.
#[tokio::test]
async fn test_empty_point_list_still_handshakes_and_finalizes() {
    let handoff = MemoryHandoff::default();
    let (near, far) = tokio::io::duplex(4096);
    let script = tokio::spawn(run_script(far, Vec::new(), handoff.clone()));

    let mut source = handoff.clone();
    let report = Controller::with_config(Session::new(near), fast_controller())
        .run(&[], &mut source)
        .await;

    assert!(report.is_complete());
    assert!(report.results.is_empty());
    let log = script.await.unwrap().unwrap();
    assert_eq!(log.status_requests, 0);
}

/// Full stack over real TCP: file handoff both ways and a report on
/// disk at the end.
#[tokio::test]
async fn test_tcp_end_to_end_with_file_handoff() {
    let dir = tempfile::tempdir().unwrap();
    let result_path = dir.path().join("Result_Batch_Point.txt");
    let report_path = dir.path().join("Final_Report.csv");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let sink = FileResultSink::new(&result_path);
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        Instrument::with_config(Session::new(stream), sink, fast_instrument(1))
            .serve()
            .await
    });

    let points = vec![TargetPoint::new(10.0, 10.5), TargetPoint::new(12.5, 10.5)];
    let session = connect(&addr.ip().to_string(), addr.port()).await.unwrap();
    let mut source = FileResultSource::new(&result_path);
    let report = Controller::with_config(session, fast_controller())
        .run(&points, &mut source)
        .await;

    assert!(report.is_complete());
    assert!(report.skipped.is_empty());
    save_report(&report_path, &report.results).unwrap();

    let written = std::fs::read_to_string(&report_path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], REPORT_HEADER);
    assert!(lines[1].starts_with("Batch_Test_Point_1,10.0000,10.5000,"));
    assert!(lines[2].starts_with("Batch_Test_Point_2,12.5000,10.5000,"));

    // One-shot handoff: the last result file was consumed.
    assert!(!result_path.exists());

    server.await.unwrap().unwrap();
}
