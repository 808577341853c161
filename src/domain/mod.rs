pub mod airport;
pub mod pilot;
pub mod radar;

pub use airport::Airport;
pub use pilot::{FlightPlan, Pilot};
pub use radar::{Fir, Radar};

use crate::types::Rect;

/// Nautical-mile half-extents used to size an object's index bounds. One
/// degree of latitude is ~60nm; longitude is left unscaled by cos(lat) since
/// the index tolerates slightly oversized boxes near the poles far better
/// than it tolerates the extra bookkeeping.
const NM_PER_DEGREE: f64 = 60.0;

pub fn square_nm(center: crate::types::Point, side_nm: f64) -> Rect {
  let half = side_nm / 2.0 / NM_PER_DEGREE;
  Rect::centered(center, half, half)
}

/// The three kinds of payload the index can hold, as a tagged union so the
/// session handler's accumulator can route on kind without downcasting.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Object {
  Pilot(Pilot),
  Radar(Radar),
  Airport(Airport),
}

impl Object {
  pub fn id(&self) -> &str {
    match self {
      Object::Pilot(p) => &p.callsign,
      Object::Radar(r) => &r.callsign,
      Object::Airport(a) => &a.icao,
    }
  }

  pub fn bounds(&self) -> Rect {
    match self {
      Object::Pilot(p) => p.bounds(),
      Object::Radar(r) => r.bounds(),
      Object::Airport(a) => a.bounds(),
    }
  }

  pub fn kind(&self) -> ObjectKind {
    match self {
      Object::Pilot(_) => ObjectKind::Pilot,
      Object::Radar(_) => ObjectKind::Radar,
      Object::Airport(_) => ObjectKind::Airport,
    }
  }

  pub fn as_pilot(&self) -> Option<&Pilot> {
    match self {
      Object::Pilot(p) => Some(p),
      _ => None,
    }
  }

  pub fn as_airport(&self) -> Option<&Airport> {
    match self {
      Object::Airport(a) => Some(a),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
  Pilot,
  Radar,
  Airport,
}

impl ObjectKind {
  /// Short code used on the wire (`o_type` in batched updates).
  pub fn wire_code(&self) -> &'static str {
    match self {
      ObjectKind::Pilot => "plt",
      ObjectKind::Radar => "rdr",
      ObjectKind::Airport => "arpt",
    }
  }
}
