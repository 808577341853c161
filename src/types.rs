use rstar::{Envelope, AABB};
use serde::{Deserialize, Serialize};

const MAX_LNG: f64 = 179.9999;
const MIN_LNG: f64 = -179.9999;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Point {
  pub lat: f64,
  pub lng: f64,
}

impl Point {
  pub fn clamp(&self) -> Self {
    Self {
      lat: self.lat.clamp(-90.0, 90.0),
      lng: (self.lng + 180.0).rem_euclid(360.0) - 180.0,
    }
  }
}

impl rstar::Point for Point {
  type Scalar = f64;
  const DIMENSIONS: usize = 2;

  fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
    let lng = generator(0);
    let lat = generator(1);
    Self { lat, lng }
  }

  fn nth(&self, index: usize) -> Self::Scalar {
    match index {
      0 => self.lng,
      1 => self.lat,
      _ => unreachable!(),
    }
  }

  fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
    match index {
      0 => &mut self.lng,
      1 => &mut self.lat,
      _ => unreachable!(),
    }
  }
}

/// A geographic bounding rectangle, `(minLng, minLat, maxLng, maxLat)`.
///
/// Equality is bit-exact on all four coordinates. `Rect::ZERO` is the reserved
/// "nowhere" sentinel used on deletions, where bounds don't matter.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
  pub min_lng: f64,
  pub min_lat: f64,
  pub max_lng: f64,
  pub max_lat: f64,
}

impl Rect {
  pub const ZERO: Rect = Rect {
    min_lng: 0.0,
    min_lat: 0.0,
    max_lng: 0.0,
    max_lat: 0.0,
  };

  pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
    Self {
      min_lng,
      min_lat,
      max_lng,
      max_lat,
    }
  }

  pub fn centered(center: Point, half_width_lng: f64, half_height_lat: f64) -> Self {
    let sw = Point {
      lat: center.lat - half_height_lat,
      lng: center.lng - half_width_lng,
    }
    .clamp();
    let ne = Point {
      lat: center.lat + half_height_lat,
      lng: center.lng + half_width_lng,
    }
    .clamp();
    Self {
      min_lng: sw.lng,
      min_lat: sw.lat,
      max_lng: ne.lng,
      max_lat: ne.lat,
    }
  }

  pub fn is_malformed(&self) -> bool {
    self.min_lng > self.max_lng || self.min_lat > self.max_lat
  }

  pub fn is_zero(&self) -> bool {
    *self == Rect::ZERO
  }

  fn sw(&self) -> Point {
    Point {
      lat: self.min_lat,
      lng: self.min_lng,
    }
  }

  fn ne(&self) -> Point {
    Point {
      lat: self.max_lat,
      lng: self.max_lng,
    }
  }

  /// One or two axis-aligned envelopes covering this rect, splitting at the
  /// antimeridian when `min_lng > max_lng` would otherwise make rstar's AABB
  /// silently swap the corners.
  pub fn envelopes(&self) -> Vec<AABB<Point>> {
    if self.min_lng > 0.0 && self.max_lng < 0.0 {
      vec![
        AABB::from_corners(
          Point {
            lat: self.min_lat,
            lng: self.min_lng,
          },
          Point {
            lat: self.max_lat,
            lng: MAX_LNG,
          },
        ),
        AABB::from_corners(
          Point {
            lat: self.min_lat,
            lng: MIN_LNG,
          },
          Point {
            lat: self.max_lat,
            lng: self.max_lng,
          },
        ),
      ]
    } else {
      vec![AABB::from_corners(self.sw(), self.ne())]
    }
  }

  pub fn intersects(&self, other: &Rect) -> bool {
    if self.is_zero() || other.is_zero() {
      return false;
    }
    let self_envs = self.envelopes();
    let other_envs = other.envelopes();
    self_envs
      .iter()
      .any(|a| other_envs.iter().any(|b| a.intersects(b)))
  }

  /// Axis-aligned union of several rects; `None` when the slice is empty.
  pub fn union_all(rects: &[Rect]) -> Option<Rect> {
    rects.iter().copied().reduce(|a, b| Rect {
      min_lng: a.min_lng.min(b.min_lng),
      min_lat: a.min_lat.min(b.min_lat),
      max_lng: a.max_lng.max(b.max_lng),
      max_lat: a.max_lat.max(b.max_lat),
    })
  }
}

#[cfg(test)]
pub mod tests {
  use super::*;

  #[test]
  fn test_rect_wrap() {
    let rect = Rect::new(170.0, 0.0, -170.0, 10.0);
    let envs = rect.envelopes();
    assert_eq!(envs.len(), 2);

    assert_eq!(
      envs[0].lower(),
      Point {
        lat: 0.0,
        lng: 170.0
      }
    );
    assert_eq!(
      envs[0].upper(),
      Point {
        lat: 10.0,
        lng: MAX_LNG
      }
    );

    assert_eq!(
      envs[1].lower(),
      Point {
        lat: 0.0,
        lng: MIN_LNG
      }
    );
    assert_eq!(
      envs[1].upper(),
      Point {
        lat: 10.0,
        lng: -170.0
      }
    );
  }

  #[test]
  fn test_nowrap() {
    let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
    let envs = rect.envelopes();
    assert_eq!(envs.len(), 1);
    assert_eq!(envs[0].lower(), Point { lat: 0.0, lng: 0.0 });
    assert_eq!(
      envs[0].upper(),
      Point {
        lat: 10.0,
        lng: 10.0
      }
    );
  }

  #[test]
  fn test_intersects() {
    let a = Rect::new(-10.0, 30.0, 10.0, 60.0);
    let b = Rect::new(0.0, 40.0, 5.0, 45.0);
    assert!(a.intersects(&b));
    let c = Rect::new(20.0, 40.0, 25.0, 45.0);
    assert!(!a.intersects(&c));
  }

  #[test]
  fn test_zero_rect_never_intersects() {
    let a = Rect::new(-10.0, 30.0, 10.0, 60.0);
    assert!(!a.intersects(&Rect::ZERO));
    assert!(!Rect::ZERO.intersects(&Rect::ZERO));
  }

  #[test]
  fn test_malformed() {
    assert!(Rect::new(10.0, 0.0, -10.0, 5.0).is_malformed());
    assert!(!Rect::new(-10.0, 0.0, 10.0, 5.0).is_malformed());
  }
}
