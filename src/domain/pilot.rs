use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Point, Rect};

use super::square_nm;

const PILOT_SIZE_NM: f64 = 0.005;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Pilot {
  pub cid: u64,
  pub name: String,
  pub callsign: String,
  pub server: String,
  pub pilot_rating: i32,
  pub position: Point,
  pub altitude: i32,
  pub groundspeed: i32,
  pub heading: i16,
  pub transponder: String,
  pub qnh_i_hg: u16,
  pub qnh_mb: u16,
  pub flight_plan: Option<FlightPlan>,
  pub logon_time: DateTime<Utc>,
  pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlightPlan {
  /// Normalised to "I" or "V"; see `normalise_flight_rules`.
  pub flight_rules: String,
  pub aircraft: String,
  pub departure: String,
  pub arrival: String,
  pub alternate: String,
  pub cruise_tas: u16,
  pub altitude: u16,
  pub deptime: String,
  pub enroute_time: String,
  pub fuel_time: String,
  pub remarks: String,
  pub route: String,
}

/// `{callsign}-{cid}-{logonTime-epoch}`, stable for one login session.
pub fn track_id(pilot: &Pilot) -> String {
  format!(
    "{}-{}-{}",
    pilot.callsign,
    pilot.cid,
    pilot.logon_time.timestamp()
  )
}

pub fn normalise_flight_rules(raw: &str) -> Option<String> {
  match raw.to_ascii_uppercase().as_str() {
    "I" | "IFR" => Some("I".to_owned()),
    "V" | "VFR" => Some("V".to_owned()),
    _ => None,
  }
}

impl Pilot {
  pub fn bounds(&self) -> Rect {
    square_nm(self.position, PILOT_SIZE_NM)
  }
}
