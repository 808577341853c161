use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Rect;

/// A Flight Information Region: a rectangular airspace block a controller
/// (radar) position is responsible for.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Fir {
  pub icao: String,
  pub boundaries: Rect,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Radar {
  pub callsign: String,
  pub cid: u64,
  pub name: String,
  pub frequency: String,
  pub facility: i8,
  pub rating: i32,
  pub firs: Vec<Fir>,
  pub logon_time: DateTime<Utc>,
  pub last_updated: DateTime<Utc>,
}

impl Radar {
  /// Axis-aligned union of all FIR boundary rectangles; the reserved zero
  /// rect (effectively unplaced) when the controller owns no FIR.
  pub fn bounds(&self) -> Rect {
    let rects: Vec<Rect> = self.firs.iter().map(|f| f.boundaries).collect();
    Rect::union_all(&rects).unwrap_or(Rect::ZERO)
  }
}
