use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::TrackConfig;
use crate::domain::Pilot;

use super::{Track, TrackBackend, TrackError, TrackPoint};

/// Embedded SQL backend. Schema (§6):
///   tracks(id TEXT PRIMARY KEY, track_code TEXT UNIQUE, created_at TIMESTAMP)
///   track_points(track_id TEXT REFERENCES tracks(id) ON DELETE CASCADE,
///                latitude, longitude, altitude, heading, groundspeed, ts)
pub struct SqliteBackend {
  pool: SqlitePool,
}

impl SqliteBackend {
  pub async fn connect(cfg: &TrackConfig) -> Result<Self, TrackError> {
    let path = cfg
      .options
      .addr
      .clone()
      .unwrap_or_else(|| "skyfan_tracks.db".to_owned());
    let opts = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
    let max_conns = if path == ":memory:" { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
      .max_connections(max_conns)
      .connect_with(opts)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;

    sqlx::query(
      "CREATE TABLE IF NOT EXISTS tracks (
         id TEXT PRIMARY KEY,
         track_code TEXT UNIQUE NOT NULL,
         created_at TIMESTAMP NOT NULL
       )",
    )
    .execute(&pool)
    .await
    .map_err(|e| TrackError::Backend(e.to_string()))?;

    sqlx::query(
      "CREATE TABLE IF NOT EXISTS track_points (
         track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
         latitude REAL NOT NULL,
         longitude REAL NOT NULL,
         altitude INTEGER NOT NULL,
         heading INTEGER NOT NULL,
         groundspeed INTEGER NOT NULL,
         ts INTEGER NOT NULL
       )",
    )
    .execute(&pool)
    .await
    .map_err(|e| TrackError::Backend(e.to_string()))?;

    Ok(Self { pool })
  }
}

#[async_trait]
impl TrackBackend for SqliteBackend {
  async fn write_track(&self, pilot: &Pilot) -> Result<(), TrackError> {
    let id = crate::domain::pilot::track_id(pilot);
    let point: TrackPoint = pilot.into();

    let mut tx = self.pool.begin().await.map_err(|e| TrackError::Backend(e.to_string()))?;

    sqlx::query(
      "INSERT INTO tracks (id, track_code, created_at) VALUES (?, ?, ?)
       ON CONFLICT(id) DO NOTHING",
    )
    .bind(&id)
    .bind(&id)
    .bind(pilot.logon_time)
    .execute(&mut *tx)
    .await
    .map_err(|e| TrackError::Backend(e.to_string()))?;

    let track_size: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM track_points WHERE track_id = ?")
      .bind(&id)
      .fetch_one(&mut *tx)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;

    let last: Option<(i64, f64, f64, i32, i16, i32, i64)> = sqlx::query_as(
      "SELECT rowid, latitude, longitude, altitude, heading, groundspeed, ts
       FROM track_points WHERE track_id = ? ORDER BY rowid DESC LIMIT 1",
    )
    .bind(&id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| TrackError::Backend(e.to_string()))?;

    if let Some((_, _, _, _, _, _, last_ts)) = &last {
      // Out-of-order sample (stale cache upstream): silently skip rather
      // than rewriting history.
      if point.ts < *last_ts {
        tx.commit().await.map_err(|e| TrackError::Backend(e.to_string()))?;
        return Ok(());
      }
    }

    // Below two points there's nothing yet to warm up against, so the
    // second sample always appends; only the third point on coalesces.
    let coalesce = track_size >= 2
      && match &last {
        Some((_, lat, lng, alt, hdg, gs, _)) => {
          *lat == point.lat && *lng == point.lng && *alt == point.altitude && *hdg == point.heading && *gs == point.groundspeed
        }
        None => false,
      };

    if coalesce {
      let (rowid, ..) = last.unwrap();
      sqlx::query("UPDATE track_points SET ts = ? WHERE rowid = ?")
        .bind(point.ts)
        .bind(rowid)
        .execute(&mut *tx)
        .await
        .map_err(|e| TrackError::Backend(e.to_string()))?;
    } else {
      sqlx::query(
        "INSERT INTO track_points (track_id, latitude, longitude, altitude, heading, groundspeed, ts)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
      )
      .bind(&id)
      .bind(point.lat)
      .bind(point.lng)
      .bind(point.altitude)
      .bind(point.heading)
      .bind(point.groundspeed)
      .bind(point.ts)
      .execute(&mut *tx)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;
    }

    tx.commit().await.map_err(|e| TrackError::Backend(e.to_string()))?;
    Ok(())
  }

  async fn load_track_by_id(&self, id: &str) -> Result<Track, TrackError> {
    let created_at: Option<(DateTime<Utc>,)> = sqlx::query_as("SELECT created_at FROM tracks WHERE id = ?")
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;
    let (created_at,) = created_at.ok_or(TrackError::NotFound)?;

    let rows: Vec<(f64, f64, i32, i16, i32, i64)> = sqlx::query_as(
      "SELECT latitude, longitude, altitude, heading, groundspeed, ts
       FROM track_points WHERE track_id = ? ORDER BY rowid ASC",
    )
    .bind(id)
    .fetch_all(&self.pool)
    .await
    .map_err(|e| TrackError::Backend(e.to_string()))?;

    let mut track = Track::new(created_at);
    for (lat, lng, altitude, heading, groundspeed, ts) in rows {
      track.points.push(TrackPoint {
        lat,
        lng,
        heading,
        altitude,
        groundspeed,
        ts,
      });
    }
    Ok(track)
  }

  async fn list_ids(&self) -> Result<Vec<String>, TrackError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM tracks")
      .fetch_all(&self.pool)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
  }

  async fn close(&self) -> Result<(), TrackError> {
    self.pool.close().await;
    Ok(())
  }

  async fn purge_expired(&self, purge_period: chrono::Duration) -> Result<u64, TrackError> {
    let cutoff = Utc::now() - purge_period;
    let result = sqlx::query("DELETE FROM tracks WHERE created_at < ?")
      .bind(cutoff)
      .execute(&self.pool)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;
    Ok(result.rows_affected())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{TrackConfig, TrackOptions};
  use crate::types::Point;

  fn pilot(callsign: &str) -> Pilot {
    Pilot {
      cid: 1,
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

  async fn test_backend() -> SqliteBackend {
    let cfg = TrackConfig {
      engine: "sqlite".into(),
      options: TrackOptions {
        addr: Some(":memory:".into()),
        password: None,
        db: None,
        purge_period: chrono::Duration::hours(24),
      },
    };
    SqliteBackend::connect(&cfg).await.unwrap()
  }

  #[tokio::test]
  async fn test_write_and_load() {
    let backend = test_backend().await;
    let p = pilot("ABC123");
    backend.write_track(&p).await.unwrap();
    let track = backend.load_track(&p).await.unwrap();
    assert_eq!(track.points.len(), 1);
  }

  #[tokio::test]
  async fn test_repeated_position_coalesces() {
    let backend = test_backend().await;
    let mut p = pilot("ABC123");
    backend.write_track(&p).await.unwrap();
    p.last_updated = Utc::now() + chrono::Duration::seconds(5);
    backend.write_track(&p).await.unwrap();
    let track = backend.load_track(&p).await.unwrap();
    assert_eq!(track.points.len(), 1);
  }

  #[tokio::test]
  async fn test_purge_removes_old_tracks() {
    let backend = test_backend().await;
    let p = pilot("OLD1");
    backend.write_track(&p).await.unwrap();
    let removed = backend.purge_expired(chrono::Duration::seconds(-1)).await.unwrap();
    assert_eq!(removed, 1);
    assert!(backend.load_track(&p).await.is_err());
  }
}
