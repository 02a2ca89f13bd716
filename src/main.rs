//! Command-line entry point: drive a batch against a live instrument,
//! or stand in for one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tribolink::instrument::DEFAULT_BUSY_POLLS;
use tribolink::transport::{DEFAULT_HOST, DEFAULT_PORT};
use tribolink::{
    connect, load_points, save_report, BatchStatus, Controller, ControllerConfig, FileResultSink,
    FileResultSource, Instrument, InstrumentConfig, Session,
};

const DEFAULT_POINTS_FILE: &str = "test_points.csv";
const DEFAULT_RESULT_FILE: &str = "Result_Batch_Point.txt";
const DEFAULT_REPORT_FILE: &str = "Final_Report.csv";

#[derive(Parser, Debug)]
#[command(
    name = "tribolink",
    version,
    about = "Batch automation for a scanning indentation tester"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive a batch of indentation tests against an instrument.
    Run {
        /// Instrument host.
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        /// Instrument port.
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Target point list, one `x,y` pair per line.
        #[arg(long, default_value = DEFAULT_POINTS_FILE)]
        points: PathBuf,

        /// Result file the instrument writes after each test.
        #[arg(long, default_value = DEFAULT_RESULT_FILE)]
        result_file: PathBuf,

        /// Final report destination.
        #[arg(long, default_value = DEFAULT_REPORT_FILE)]
        report: PathBuf,

        /// Fail a phase if the instrument stays silent this many
        /// seconds. Waits indefinitely when omitted.
        #[arg(long)]
        recv_timeout_secs: Option<u64>,
    },
    /// Simulate an instrument, serving one connection at a time.
    Simulate {
        /// Port to listen on.
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// BUSY replies served before each test completes.
        #[arg(long, default_value_t = DEFAULT_BUSY_POLLS)]
        busy_polls: u32,

        /// Result file written after each test.
        #[arg(long, default_value = DEFAULT_RESULT_FILE)]
        result_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            host,
            port,
            points,
            result_file,
            report,
            recv_timeout_secs,
        } => run_batch(&host, port, &points, &result_file, &report, recv_timeout_secs).await,
        Command::Simulate {
            port,
            busy_polls,
            result_file,
        } => simulate(port, busy_polls, &result_file).await,
    }
}

async fn run_batch(
    host: &str,
    port: u16,
    points_file: &Path,
    result_file: &Path,
    report_file: &Path,
    recv_timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let points = load_points(points_file)
        .with_context(|| format!("loading target points from {}", points_file.display()))?;
    info!(count = points.len(), "loaded target points");

    let session = connect(host, port)
        .await
        .with_context(|| format!("connecting to instrument at {host}:{port}"))?;

    let config = ControllerConfig {
        recv_timeout: recv_timeout_secs.map(Duration::from_secs),
        ..ControllerConfig::default()
    };
    let mut source = FileResultSource::new(result_file);
    let report = Controller::with_config(session, config)
        .run(&points, &mut source)
        .await;

    for skipped in &report.skipped {
        warn!(point = skipped.index + 1, reason = %skipped.reason, "point missing from report");
    }

    // Partial results are still worth a report; only a run that
    // collected nothing and failed produces no output file.
    if !report.results.is_empty() || report.is_complete() {
        save_report(report_file, &report.results)
            .with_context(|| format!("writing report to {}", report_file.display()))?;
        info!(
            rows = report.results.len(),
            path = %report_file.display(),
            "report written",
        );
    }

    match report.status {
        BatchStatus::Completed => Ok(()),
        BatchStatus::Aborted(err) => Err(err).context("batch aborted"),
    }
}

async fn simulate(port: u16, busy_polls: u32, result_file: &Path) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding simulator to port {port}"))?;
    info!(port, "simulator listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!(%peer, "controller connected");

        let config = InstrumentConfig {
            busy_polls,
            ..InstrumentConfig::default()
        };
        let sink = FileResultSink::new(result_file);
        match Instrument::with_config(Session::new(stream), sink, config)
            .serve()
            .await
        {
            Ok(()) => info!(%peer, "controller disconnected"),
            Err(err) => error!(%peer, error = %err, "session failed"),
        }
    }
}
