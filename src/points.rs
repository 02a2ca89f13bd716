//! Target points and the coordinate payload format.
//!
//! A batch visits an ordered list of stage positions. The list comes
//! from a plain text file, one `x,y` pair per line; order in the file is
//! visit order and, ultimately, report row order.

use std::path::Path;

use crate::error::{Result, TriboError};

/// One stage position to visit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPoint {
    pub x: f64,
    pub y: f64,
}

impl TargetPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Render the MOVE_XY payload: `"X:Y"`, each coordinate fixed to
    /// exactly four decimal places.
    ///
    /// # Example
    ///
    /// ```
    /// use tribolink::points::TargetPoint;
    ///
    /// let point = TargetPoint::new(10.0, 10.5);
    /// assert_eq!(point.coordinate_payload(), "10.0000:10.5000");
    /// ```
    pub fn coordinate_payload(&self) -> String {
        format!("{:.4}:{:.4}", self.x, self.y)
    }
}

/// Parse a target-point list from text.
///
/// One point per line, comma-separated; blank lines are skipped; fields
/// beyond the first two are ignored. A non-blank line that does not
/// yield two numbers fails the whole load with its line number, so a
/// bad file is caught before any connection is opened.
pub fn parse_points(input: &str) -> Result<Vec<TargetPoint>> {
    let mut points = Vec::new();
    for (index, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        let (x_raw, y_raw) = match (fields.next(), fields.next()) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(TriboError::MalformedPointList {
                    line: index + 1,
                    detail: "expected two comma-separated coordinates".to_string(),
                })
            }
        };
        let x = parse_coordinate(x_raw, "X", index + 1)?;
        let y = parse_coordinate(y_raw, "Y", index + 1)?;
        points.push(TargetPoint::new(x, y));
    }
    Ok(points)
}

fn parse_coordinate(raw: &str, axis: &str, line: usize) -> Result<f64> {
    raw.trim()
        .parse()
        .map_err(|_| TriboError::MalformedPointList {
            line,
            detail: format!("bad {axis} coordinate {:?}", raw.trim()),
        })
}

/// Load a target-point list from a file.
pub fn load_points(path: &Path) -> Result<Vec<TargetPoint>> {
    let text = std::fs::read_to_string(path)?;
    parse_points(&text)
}
