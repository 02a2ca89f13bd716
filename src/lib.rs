//! # tribolink
//!
//! Automation client for a Triboscan-style scanning indentation tester,
//! speaking its framed message protocol over one persistent TCP
//! connection.
//!
//! ## Architecture
//!
//! - **Protocol** (`protocol`): 12-byte little-endian header framing and
//!   the closed message catalog shared by both roles
//! - **Transport** (`transport`): one session per connection, whole-frame
//!   send/receive with an optional receive timeout
//! - **Controller** (`controller`): the workflow state machine that drives
//!   a batch of indentation tests and collects their results
//! - **Instrument** (`instrument`): the responder state machine, also the
//!   built-in simulator for integration testing
//!
//! ## Example
//!
//! ```no_run
//! use tribolink::{connect, Controller, FileResultSource, TargetPoint};
//!
//! #[tokio::main]
//! async fn main() -> tribolink::Result<()> {
//!     let session = connect("127.0.0.1", 10005).await?;
//!     let points = vec![TargetPoint::new(10.0, 10.5), TargetPoint::new(12.0, 10.5)];
//!     let mut source = FileResultSource::new("Result_Batch_Point.txt");
//!
//!     let report = Controller::new(session).run(&points, &mut source).await;
//!     for result in &report.results {
//!         println!("{}", result.csv_row());
//!     }
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod error;
pub mod instrument;
pub mod points;
pub mod protocol;
pub mod results;
pub mod transport;

pub use controller::{BatchReport, BatchStatus, Controller, ControllerConfig, SkippedPoint};
pub use error::{Result, TriboError};
pub use instrument::{Instrument, InstrumentConfig};
pub use points::{load_points, parse_points, TargetPoint};
pub use protocol::{Frame, Header, MessageKind};
pub use results::{
    save_report, write_report, FileResultSink, FileResultSource, Measurement, PointResult,
    ResultSink, ResultSource,
};
pub use transport::{connect, Session};
