use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::debug;
use tokio::task::JoinHandle;

use crate::domain::Pilot;

use super::{Track, TrackBackend, TrackError, TrackPoint};

struct State {
  tracks: HashMap<String, Track>,
}

/// In-process trackID -> Track map, guarded by a single mutex covering both
/// reads/writes and the GC pass, as §5 requires for this backend. The map is
/// behind an `Arc` purely so the background GC ticker can hold its own
/// handle to it without requiring a `'static` borrow of the backend itself.
pub struct MemoryBackend {
  state: Arc<Mutex<State>>,
  purge_period: Duration,
  gc_handle: JoinHandle<()>,
}

impl MemoryBackend {
  pub fn new(purge_period: Duration) -> Self {
    let state = Arc::new(Mutex::new(State {
      tracks: HashMap::new(),
    }));
    let gc_handle = {
      let state = state.clone();
      let tick = purge_period.to_std().unwrap_or(StdDuration::from_secs(300));
      tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
          interval.tick().await;
          MemoryBackend::gc_once(&state, purge_period);
        }
      })
    };
    Self {
      state,
      purge_period,
      gc_handle,
    }
  }

  fn gc_once(state: &Mutex<State>, purge_period: Duration) {
    let now = Utc::now();
    let mut state = state.lock().unwrap();
    let before = state.tracks.len();
    state.tracks.retain(|_, t| now - t.created_at <= purge_period);
    let removed = before - state.tracks.len();
    if removed > 0 {
      debug!("memory track store: purged {removed} track(s) older than {purge_period}");
    }
  }
}

#[async_trait]
impl TrackBackend for MemoryBackend {
  async fn write_track(&self, pilot: &Pilot) -> Result<(), TrackError> {
    let id = crate::domain::pilot::track_id(pilot);
    let point: TrackPoint = pilot.into();
    let mut state = self.state.lock().unwrap();
    let track = state
      .tracks
      .entry(id)
      .or_insert_with(|| Track::new(pilot.logon_time));
    track.push(point);
    Ok(())
  }

  async fn load_track_by_id(&self, id: &str) -> Result<Track, TrackError> {
    self
      .state
      .lock()
      .unwrap()
      .tracks
      .get(id)
      .cloned()
      .ok_or(TrackError::NotFound)
  }

  async fn list_ids(&self) -> Result<Vec<String>, TrackError> {
    Ok(self.state.lock().unwrap().tracks.keys().cloned().collect())
  }

  async fn close(&self) -> Result<(), TrackError> {
    self.gc_handle.abort();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Pilot;
  use crate::types::Point;

  fn pilot(callsign: &str) -> Pilot {
    Pilot {
      cid: 42,
      name: "Test".into(),
      callsign: callsign.into(),
      server: "S1".into(),
      pilot_rating: 1,
      position: Point { lat: 1.0, lng: 2.0 },
      altitude: 10000,
      groundspeed: 300,
      heading: 90,
      transponder: "2000".into(),
      qnh_i_hg: 2992,
      qnh_mb: 1013,
      flight_plan: None,
      logon_time: Utc::now(),
      last_updated: Utc::now(),
    }
  }

  #[tokio::test]
  async fn test_write_then_load() {
    let backend = MemoryBackend::new(Duration::hours(24));
    let p = pilot("ABC123");
    backend.write_track(&p).await.unwrap();
    let track = backend.load_track(&p).await.unwrap();
    assert_eq!(track.points.len(), 1);
    assert_eq!(track.points[0].lat, 1.0);
  }

  #[tokio::test]
  async fn test_unknown_id_is_not_found() {
    let backend = MemoryBackend::new(Duration::hours(24));
    let err = backend.load_track_by_id("nope").await.unwrap_err();
    assert!(matches!(err, TrackError::NotFound));
  }

  #[tokio::test]
  async fn test_gc_purges_old_tracks() {
    let backend = MemoryBackend::new(Duration::seconds(-1));
    let p = pilot("OLD1");
    backend.write_track(&p).await.unwrap();
    MemoryBackend::gc_once(&backend.state, backend.purge_period);
    let err = backend
      .load_track_by_id(&crate::domain::pilot::track_id(&p))
      .await
      .unwrap_err();
    assert!(matches!(err, TrackError::NotFound));
  }
}
