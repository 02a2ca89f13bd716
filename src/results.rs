//! Measurement handoff and report rendering.
//!
//! After each completed point the instrument leaves its measurements in
//! a small key-value result file and the controller picks them up: a
//! one-shot handoff, consumed (deleted) once read. Both ends of that
//! handoff are traits here so tests can swap the filesystem out:
//!
//! - [`ResultSink`]: instrument side, publishes one [`Measurement`]
//! - [`ResultSource`]: controller side, takes the pending measurement
//!
//! The file format, reference-compatible:
//!
//! ```text
//! TestName: Batch_Test_Point_1
//! Hardness: 11.23 GPa
//! Modulus: 154.70 GPa
//! ```
//!
//! At run end the collected [`PointResult`]s are rendered into a CSV
//! report with the reference header.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, TriboError};
use crate::points::TargetPoint;

/// Header row of the final report.
pub const REPORT_HEADER: &str = "TestName,X,Y,Hardness(GPa),Modulus(GPa)";

/// One test's measured values, as handed off by the instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub test_name: String,
    /// Indentation hardness in GPa.
    pub hardness: f64,
    /// Reduced elastic modulus in GPa.
    pub modulus: f64,
}

/// A completed point: where it was tested and what was measured.
#[derive(Debug, Clone, PartialEq)]
pub struct PointResult {
    pub test_name: String,
    pub x: f64,
    pub y: f64,
    pub hardness: f64,
    pub modulus: f64,
}

impl PointResult {
    /// Combine a handed-off measurement with the point it was taken at.
    pub fn new(measurement: Measurement, point: TargetPoint) -> Self {
        Self {
            test_name: measurement.test_name,
            x: point.x,
            y: point.y,
            hardness: measurement.hardness,
            modulus: measurement.modulus,
        }
    }

    /// Render one report row.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{:.4},{:.4},{:.2},{:.2}",
            self.test_name, self.x, self.y, self.hardness, self.modulus
        )
    }
}

/// Controller-side seam: where measurements for completed points come
/// from.
pub trait ResultSource {
    /// Take the measurement for the point that just completed.
    ///
    /// Called exactly once per completion signal. Failures are contained
    /// to that point by the caller; they never abort the batch.
    fn take(&mut self) -> Result<Measurement>;
}

/// Instrument-side seam: where finished measurements go.
pub trait ResultSink {
    /// Publish the measurement for the test that just finished, making
    /// it visible to the controller before the completion reply is sent.
    fn publish(&mut self, measurement: &Measurement) -> Result<()>;
}

/// File-backed [`ResultSource`]: reads, parses, and deletes the result
/// file.
#[derive(Debug, Clone)]
pub struct FileResultSource {
    path: PathBuf,
}

impl FileResultSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultSource for FileResultSource {
    fn take(&mut self) -> Result<Measurement> {
        let text = fs::read_to_string(&self.path).map_err(|err| {
            TriboError::MalformedResultFile {
                path: self.path.clone(),
                detail: err.to_string(),
            }
        })?;
        let measurement =
            parse_measurement(&text).map_err(|detail| TriboError::MalformedResultFile {
                path: self.path.clone(),
                detail,
            })?;
        // One-shot handoff: consume only after a successful parse, so a
        // bad file stays on disk for inspection.
        fs::remove_file(&self.path)?;
        Ok(measurement)
    }
}

/// File-backed [`ResultSink`]: writes the reference key-value format.
#[derive(Debug, Clone)]
pub struct FileResultSink {
    path: PathBuf,
}

impl FileResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultSink for FileResultSink {
    fn publish(&mut self, measurement: &Measurement) -> Result<()> {
        let body = format!(
            "TestName: {}\nHardness: {:.2} GPa\nModulus: {:.2} GPa\n",
            measurement.test_name, measurement.hardness, measurement.modulus
        );
        fs::write(&self.path, body)?;
        Ok(())
    }
}

/// Parse the key-value result format. All three keys are required;
/// numeric values may carry a trailing unit suffix, with or without a
/// separating space.
fn parse_measurement(text: &str) -> std::result::Result<Measurement, String> {
    let mut test_name = None;
    let mut hardness = None;
    let mut modulus = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "TestName" => test_name = Some(value.trim().to_string()),
            "Hardness" => hardness = Some(parse_quantity(value, "Hardness")?),
            "Modulus" => modulus = Some(parse_quantity(value, "Modulus")?),
            _ => {}
        }
    }

    Ok(Measurement {
        test_name: test_name.ok_or("missing TestName")?,
        hardness: hardness.ok_or("missing Hardness")?,
        modulus: modulus.ok_or("missing Modulus")?,
    })
}

fn parse_quantity(raw: &str, key: &str) -> std::result::Result<f64, String> {
    let number = raw
        .trim()
        .trim_end_matches(|c: char| c.is_alphabetic())
        .trim();
    number
        .parse()
        .map_err(|_| format!("unparseable {key} value {raw:?}"))
}

/// Render the final report into any writer.
pub fn write_report<W: Write>(out: &mut W, results: &[PointResult]) -> std::io::Result<()> {
    writeln!(out, "{REPORT_HEADER}")?;
    for result in results {
        writeln!(out, "{}", result.csv_row())?;
    }
    Ok(())
}

/// Write the final report file, one row per completed point in
/// completion order.
pub fn save_report(path: &Path, results: &[PointResult]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    write_report(&mut file, results)?;
    file.flush()?;
    Ok(())
}
