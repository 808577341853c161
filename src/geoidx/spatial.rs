use rstar::{RTreeObject, AABB};

use crate::types::{Point, Rect};

/// Wraps an object id + its current bounds for storage in the RTree. Lookup
/// by id goes through the index's parallel `HashMap`; the tree only answers
/// "what intersects this viewport" range queries.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
  pub id: String,
  pub rect: Rect,
}

impl PartialEq for SpatialEntry {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl RTreeObject for SpatialEntry {
  type Envelope = AABB<Point>;

  fn envelope(&self) -> Self::Envelope {
    if self.rect.is_zero() {
      return AABB::from_point(Point { lat: 0.0, lng: 0.0 });
    }
    let envs = self.rect.envelopes();
    if envs.len() == 1 {
      envs[0]
    } else {
      // Antimeridian-wrapping object bounds: cover the whole latitude band
      // rather than try to store two tree entries for one id.
      AABB::from_corners(
        Point {
          lat: self.rect.min_lat,
          lng: -179.9999,
        },
        Point {
          lat: self.rect.max_lat,
          lng: 179.9999,
        },
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstar::RTree;

  #[test]
  fn test_intersection() {
    let mut tree = RTree::new();
    tree.insert(SpatialEntry {
      id: "A".to_owned(),
      rect: Rect::new(-1.0, -1.0, 1.0, 1.0),
    });
    tree.insert(SpatialEntry {
      id: "B".to_owned(),
      rect: Rect::new(50.0, 50.0, 51.0, 51.0),
    });

    let query = Rect::new(-2.0, -2.0, 2.0, 2.0);
    let found: Vec<_> = query
      .envelopes()
      .iter()
      .flat_map(|env| tree.locate_in_envelope_intersecting(env))
      .map(|e| e.id.clone())
      .collect();

    assert_eq!(found, vec!["A".to_owned()]);
  }
}
