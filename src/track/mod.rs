pub mod memory;
pub mod redis_store;
pub mod sqlite_store;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::TrackConfig;
use crate::domain::Pilot;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct TrackPoint {
  pub lat: f64,
  pub lng: f64,
  pub heading: i16,
  pub altitude: i32,
  pub groundspeed: i32,
  pub ts: i64,
}

impl TrackPoint {
  fn same_position_as(&self, other: &TrackPoint) -> bool {
    self.lat == other.lat
      && self.lng == other.lng
      && self.heading == other.heading
      && self.altitude == other.altitude
      && self.groundspeed == other.groundspeed
  }
}

impl From<&Pilot> for TrackPoint {
  fn from(p: &Pilot) -> Self {
    Self {
      lat: p.position.lat,
      lng: p.position.lng,
      heading: p.heading,
      altitude: p.altitude,
      groundspeed: p.groundspeed,
      ts: p.last_updated.timestamp(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Track {
  pub created_at: DateTime<Utc>,
  pub points: Vec<TrackPoint>,
}

impl Track {
  pub fn new(created_at: DateTime<Utc>) -> Self {
    Self {
      created_at,
      points: Vec::new(),
    }
  }

  /// Point compression rule (§4.2): below two points there's nothing yet to
  /// warm up against, so the sample always appends. From the second sample
  /// on, coalesce into the last point when position/heading/altitude/
  /// groundspeed are unchanged, only letting the timestamp move forward;
  /// otherwise append.
  pub fn push(&mut self, point: TrackPoint) {
    if self.points.len() < 2 {
      self.points.push(point);
      return;
    }
    match self.points.last_mut() {
      Some(last) if last.same_position_as(&point) => last.ts = point.ts,
      _ => self.points.push(point),
    }
  }
}

#[derive(Debug)]
pub enum TrackError {
  NotFound,
  NotConfigured,
  ConfigInvalid(String),
  Backend(String),
}

impl fmt::Display for TrackError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TrackError::NotFound => write!(f, "track not found"),
      TrackError::NotConfigured => write!(f, "track store not configured"),
      TrackError::ConfigInvalid(msg) => write!(f, "invalid track store configuration: {msg}"),
      TrackError::Backend(msg) => write!(f, "track store backend error: {msg}"),
    }
  }
}

impl std::error::Error for TrackError {}

#[async_trait]
pub trait TrackBackend: Send + Sync {
  async fn write_track(&self, pilot: &Pilot) -> Result<(), TrackError>;
  async fn load_track_by_id(&self, id: &str) -> Result<Track, TrackError>;
  async fn load_track(&self, pilot: &Pilot) -> Result<Track, TrackError> {
    self.load_track_by_id(&crate::domain::pilot::track_id(pilot)).await
  }
  async fn list_ids(&self) -> Result<Vec<String>, TrackError>;
  async fn close(&self) -> Result<(), TrackError>;

  /// Drops tracks older than `purge_period`, returning the number removed.
  /// The memory backend runs its own internal GC ticker and never needs this
  /// called externally, so the default is a no-op; durable backends override
  /// it and rely on the caller driving it periodically (see
  /// `provider::spawn_track_purge`).
  async fn purge_expired(&self, _purge_period: chrono::Duration) -> Result<u64, TrackError> {
    Ok(0)
  }
}

/// Backend-selection constructor switch on `track.engine` (§9 design note:
/// replace the global read-writer singleton with an explicit handle built
/// once at Provider construction).
pub async fn build_backend(cfg: &TrackConfig) -> Result<Box<dyn TrackBackend>, TrackError> {
  match cfg.engine.as_str() {
    "memory" => Ok(Box::new(memory::MemoryBackend::new(cfg.options.purge_period))),
    "redis" => Ok(Box::new(redis_store::RedisBackend::connect(cfg).await?)),
    "sqlite" => Ok(Box::new(sqlite_store::SqliteBackend::connect(cfg).await?)),
    other => Err(TrackError::ConfigInvalid(format!(
      "unknown track.engine {other:?}, expected memory|redis|sqlite"
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pt(lat: f64, ts: i64) -> TrackPoint {
    TrackPoint {
      lat,
      lng: 0.0,
      heading: 90,
      altitude: 10000,
      groundspeed: 300,
      ts,
    }
  }

  #[test]
  fn test_compression_coalesces_stationary_points_after_warmup() {
    let mut track = Track::new(Utc::now());
    track.push(pt(1.0, 1));
    track.push(pt(1.0, 2));
    track.push(pt(1.0, 3));
    // below two points there's nothing to warm up against, so the first two
    // samples both append; only the third (now past warm-up) coalesces.
    assert_eq!(track.points.len(), 2);
    assert_eq!(track.points[1].ts, 3);
  }

  #[test]
  fn test_two_identical_writes_both_append_during_warmup() {
    let mut track = Track::new(Utc::now());
    track.push(pt(5.0, 1));
    track.push(pt(5.0, 2));
    assert_eq!(track.points.len(), 2);
    assert_eq!(track.points[1].ts, 2);
  }

  #[test]
  fn test_compression_keeps_moving_points() {
    let mut track = Track::new(Utc::now());
    track.push(pt(1.0, 1)); // warm-up: appends
    track.push(pt(1.0, 2)); // warm-up: appends
    track.push(pt(1.0, 3)); // past warm-up, same position: coalesces
    track.push(pt(2.0, 4)); // moved: appends
    assert_eq!(track.points.len(), 3);
    assert_eq!(track.points[2].lat, 2.0);
  }
}
