use std::sync::{Arc, Mutex};

use crate::domain::Object;
use crate::filter::{self, error::FilterCompileError};
use crate::geoidx::{Filter, GeoIdxError, Subscription as IdxSubscription};
use crate::types::Rect;

/// Wraps a geoidx subscription with the two named predicate slots the wire
/// protocol exposes (§4.5): an airport-controlled filter and a pilot query
/// filter. Each keeps its own slot so that setting one never clobbers the
/// other; both are recombined by conjunction and pushed down as a single new
/// filter set, which triggers exactly one diff pass.
pub struct ClientSubscription {
  inner: IdxSubscription,
  airport_filter: Mutex<Option<Filter>>,
  pilot_filter: Mutex<Option<Filter>>,
}

fn airport_controlled_filter() -> Filter {
  Arc::new(|obj: &Object| match obj.as_airport() {
    Some(a) => a.is_controlled,
    None => true,
  })
}

impl ClientSubscription {
  pub fn new(inner: IdxSubscription) -> Self {
    Self {
      inner,
      airport_filter: Mutex::new(None),
      pilot_filter: Mutex::new(None),
    }
  }

  pub fn set_bounds(&self, viewport: Rect) -> Result<(), GeoIdxError> {
    self.inner.set_bounds(viewport)
  }

  pub fn set_airport_filter(&self, include_uncontrolled: bool) -> Result<(), GeoIdxError> {
    let mut slot = self.airport_filter.lock().unwrap();
    *slot = if include_uncontrolled { None } else { Some(airport_controlled_filter()) };
    drop(slot);
    self.push_filters()
  }

  /// Compiles and installs a pilot query filter. On compile failure the
  /// previous filter (if any) is left untouched and the error returned for
  /// the session handler to report to the client.
  pub fn set_pilot_filter(&self, query: &str) -> Result<(), FilterCompileError> {
    if query.trim().is_empty() {
      *self.pilot_filter.lock().unwrap() = None;
    } else {
      let compiled = filter::compile_pilot_filter(query)?;
      *self.pilot_filter.lock().unwrap() = Some(compiled);
    }
    self.push_filters().ok();
    Ok(())
  }

  fn push_filters(&self) -> Result<(), GeoIdxError> {
    let mut filters = Vec::new();
    if let Some(f) = self.airport_filter.lock().unwrap().clone() {
      filters.push(f);
    }
    if let Some(f) = self.pilot_filter.lock().unwrap().clone() {
      filters.push(f);
    }
    self.inner.set_filters(filters)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Airport;
  use crate::geoidx::Index;
  use crate::types::Point;

  fn airport(icao: &str, controlled: bool) -> Object {
    Object::Airport(Airport {
      icao: icao.into(),
      iata: "".into(),
      name: "".into(),
      country: "".into(),
      position: Point { lat: 0.0, lng: 0.0 },
      is_controlled: controlled,
    })
  }

  #[test]
  fn test_airport_filter_excludes_uncontrolled() {
    let idx = Arc::new(Index::new());
    let (sub, _rx) = idx.subscribe(8);
    let client = ClientSubscription::new(sub);
    client.set_airport_filter(false).unwrap();
    let f = client.airport_filter.lock().unwrap().clone().unwrap();
    assert!(!f(&airport("EGLL", false)));
    assert!(f(&airport("EGLL", true)));
  }

  #[test]
  fn test_include_uncontrolled_clears_filter() {
    let idx = Arc::new(Index::new());
    let (sub, _rx) = idx.subscribe(8);
    let client = ClientSubscription::new(sub);
    client.set_airport_filter(false).unwrap();
    client.set_airport_filter(true).unwrap();
    assert!(client.airport_filter.lock().unwrap().is_none());
  }

  #[test]
  fn test_invalid_pilot_filter_keeps_previous() {
    let idx = Arc::new(Index::new());
    let (sub, _rx) = idx.subscribe(8);
    let client = ClientSubscription::new(sub);
    client.set_pilot_filter("callsign = \"ABC\"").unwrap();
    assert!(client.set_pilot_filter("aircraft ~ \"(\"").is_err());
    assert!(client.pilot_filter.lock().unwrap().is_some());
  }
}
