//! Fixed reference data: airports and their owning FIRs (§4.4 ambient
//! ingestion). Parses the VATSpy data project's `.dat` format, which lists
//! countries/airports/FIRs as `|`-delimited lines under `[Section]` headers.
//! A FIR's boundary `Rect` is approximated as the axis-aligned bounding box
//! of the airports registered under it, since the index only ever needs a
//! rectangle, not the source project's full polygon.

use std::collections::HashMap;
use std::fmt;

use log::warn;

use crate::domain::{Airport, Fir, Radar};
use crate::types::{Point, Rect};

const DEFAULT_DATA_URL: &str =
  "https://raw.githubusercontent.com/vatsimnetwork/vatspy-data-project/master/VATSpy.dat";

#[derive(Debug)]
pub enum FixedDataError {
  Fetch(String),
  Empty,
}

impl fmt::Display for FixedDataError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FixedDataError::Fetch(msg) => write!(f, "error fetching fixed data: {msg}"),
      FixedDataError::Empty => write!(f, "fixed data source returned no airports"),
    }
  }
}

impl std::error::Error for FixedDataError {}

/// Parsed airports plus a FIR-icao -> bounds table, used by the Provider to
/// seed/refresh airport objects and to derive radar bounds for a matching
/// controller (§3 Radar: "bounds are the axis-aligned union of all its FIR
/// boundary rectangles").
pub struct FixedData {
  pub airports: Vec<Airport>,
  pub fir_bounds: HashMap<String, Rect>,
}

enum Section {
  None,
  Airports,
  Firs,
}

fn parse(src: &str) -> FixedData {
  let mut section = Section::None;
  let mut airports = Vec::new();
  let mut airport_positions: HashMap<String, Vec<Point>> = HashMap::new();
  let mut fir_airport_ids: HashMap<String, Vec<String>> = HashMap::new();

  for line in src.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') {
      continue;
    }
    if line.starts_with('[') {
      section = match &line[1..line.len() - 1] {
        "Airports" => Section::Airports,
        "FIRs" => Section::Firs,
        "IDL" => break,
        _ => Section::None,
      };
      continue;
    }

    match section {
      Section::Airports => {
        let tokens: Vec<&str> = line.split('|').collect();
        if tokens.len() != 7 {
          warn!("invalid airport line {line:?}");
          continue;
        }
        let (lat, lng) = match (tokens[2].parse::<f64>(), tokens[3].parse::<f64>()) {
          (Ok(lat), Ok(lng)) => (lat, lng),
          _ => {
            warn!("invalid airport coordinates {line:?}");
            continue;
          }
        };
        let icao = tokens[0].to_owned();
        let position = Point { lat, lng };
        airport_positions.entry(tokens[5].to_owned()).or_default().push(position);
        fir_airport_ids.entry(tokens[5].to_owned()).or_default().push(icao.clone());
        airports.push(Airport {
          icao,
          iata: tokens[4].to_owned(),
          name: tokens[1].to_owned(),
          country: String::new(),
          position,
          is_controlled: false,
        });
      }
      Section::Firs => {
        // [icao|name|prefix|boundary_id] -- boundary_id is unused here
        // since bounds are derived from member airports instead.
      }
      Section::None => {}
    }
  }

  let fir_bounds = airport_positions
    .into_iter()
    .filter_map(|(fir, points)| {
      let rects: Vec<Rect> = points.iter().map(|p| crate::domain::square_nm(*p, 20.0)).collect();
      Rect::union_all(&rects).map(|r| (fir, r))
    })
    .collect();

  FixedData { airports, fir_bounds }
}

pub async fn load(url: Option<&str>) -> Result<FixedData, FixedDataError> {
  let url = url.unwrap_or(DEFAULT_DATA_URL);
  let text = reqwest::get(url)
    .await
    .map_err(|e| FixedDataError::Fetch(e.to_string()))?
    .text()
    .await
    .map_err(|e| FixedDataError::Fetch(e.to_string()))?;
  let data = parse(&text);
  if data.airports.is_empty() {
    return Err(FixedDataError::Empty);
  }
  Ok(data)
}

/// Builds a placeholder Radar from a controller's callsign/FIR prefix match,
/// used when an ATC's position in the upstream feed only names the FIR by
/// ICAO prefix rather than providing explicit boundaries.
pub fn radar_for_fir(icao: &str, bounds: &Rect) -> Radar {
  Radar {
    callsign: icao.to_owned(),
    cid: 0,
    name: String::new(),
    frequency: String::new(),
    facility: 5,
    rating: 0,
    firs: vec![Fir {
      icao: icao.to_owned(),
      boundaries: *bounds,
    }],
    logon_time: chrono::Utc::now(),
    last_updated: chrono::Utc::now(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = "\
[Airports]
EGLL|Heathrow|51.4706|-0.461941|LHR|EGTT|0
EGKK|Gatwick|51.1481|-0.190277|LGW|EGTT|0
[FIRs]
EGTT|London|EG|
";

  #[test]
  fn test_parses_airports_and_derives_fir_bounds() {
    let data = parse(SAMPLE);
    assert_eq!(data.airports.len(), 2);
    assert_eq!(data.airports[0].icao, "EGLL");
    let bounds = data.fir_bounds.get("EGTT").expect("EGTT bounds");
    assert!(bounds.max_lng > bounds.min_lng);
  }

  #[test]
  fn test_skips_malformed_lines() {
    let data = parse("[Airports]\nBAD|LINE\n");
    assert!(data.airports.is_empty());
  }
}
