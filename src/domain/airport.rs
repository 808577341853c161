use serde::Serialize;

use crate::types::{Point, Rect};

use super::square_nm;

const AIRPORT_SIZE_NM: f64 = 3.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Airport {
  pub icao: String,
  pub iata: String,
  pub name: String,
  pub country: String,
  pub position: Point,
  pub is_controlled: bool,
}

impl Airport {
  pub fn bounds(&self) -> Rect {
    square_nm(self.position, AIRPORT_SIZE_NM)
  }
}
