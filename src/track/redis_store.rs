use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::AsyncCommands;

use crate::config::TrackConfig;
use crate::domain::Pilot;

use super::{Track, TrackBackend, TrackError, TrackPoint};

/// Key-value cache backend. Layout (§4.2):
///   tracks:{id}:created_at        -> unix ts, string
///   tracks:{id}:points            -> list of point timestamps, insertion order
///   tracks:{id}:points:{ts}       -> hash {lat,lng,alt,hdg,gs}
///   track_ids                     -> set of all known track ids
pub struct RedisBackend {
  client: redis::Client,
}

fn points_key(id: &str) -> String {
  format!("tracks:{id}:points")
}

fn point_hash_key(id: &str, ts: i64) -> String {
  format!("tracks:{id}:points:{ts}")
}

fn created_at_key(id: &str) -> String {
  format!("tracks:{id}:created_at")
}

impl RedisBackend {
  pub async fn connect(cfg: &TrackConfig) -> Result<Self, TrackError> {
    let addr = cfg
      .options
      .addr
      .as_deref()
      .ok_or_else(|| TrackError::ConfigInvalid("track.options.addr is required for the redis engine".into()))?;
    let url = match &cfg.options.password {
      Some(pw) => format!("redis://:{pw}@{addr}/{}", cfg.options.db.unwrap_or(0)),
      None => format!("redis://{addr}/{}", cfg.options.db.unwrap_or(0)),
    };
    let client = redis::Client::open(url).map_err(|e| TrackError::Backend(e.to_string()))?;
    // Fail fast if the server is unreachable rather than on first use.
    let mut conn = client
      .get_async_connection()
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;
    let _: String = redis::cmd("PING")
      .query_async(&mut conn)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;
    Ok(Self { client })
  }

  async fn conn(&self) -> Result<redis::aio::Connection, TrackError> {
    self
      .client
      .get_async_connection()
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))
  }
}

#[async_trait]
impl TrackBackend for RedisBackend {
  async fn write_track(&self, pilot: &Pilot) -> Result<(), TrackError> {
    let id = crate::domain::pilot::track_id(pilot);
    let point: TrackPoint = pilot.into();
    let mut conn = self.conn().await?;

    let created_key = created_at_key(&id);
    let exists: bool = conn.exists(&created_key).await.map_err(|e| TrackError::Backend(e.to_string()))?;
    if !exists {
      let _: () = conn
        .set(&created_key, pilot.logon_time.timestamp())
        .await
        .map_err(|e| TrackError::Backend(e.to_string()))?;
      let _: () = conn.sadd("track_ids", &id).await.map_err(|e| TrackError::Backend(e.to_string()))?;
    }

    let list_key = points_key(&id);
    let track_size: i64 = conn.llen(&list_key).await.map_err(|e| TrackError::Backend(e.to_string()))?;
    let last_ts: Option<i64> = conn
      .lindex(&list_key, -1)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;

    if let Some(ts) = last_ts {
      // Out-of-order sample (stale cache upstream): silently skip rather
      // than rewriting history.
      if point.ts < ts {
        return Ok(());
      }

      // Below two points there's nothing yet to warm up against, so the
      // second sample always appends; only the third point on coalesces.
      if track_size >= 2 {
        let hash_key = point_hash_key(&id, ts);
        let last = load_point(&mut conn, ts, &hash_key).await?;
        if last.same_position_as(&point) {
          let _: () = conn
            .hset(&hash_key, "ts", point.ts)
            .await
            .map_err(|e| TrackError::Backend(e.to_string()))?;
          let new_hash_key = point_hash_key(&id, point.ts);
          let _: () = conn.rename(&hash_key, &new_hash_key).await.map_err(|e| TrackError::Backend(e.to_string()))?;
          let _: () = conn
            .lset(&list_key, -1, point.ts)
            .await
            .map_err(|e| TrackError::Backend(e.to_string()))?;
          return Ok(());
        }
      }
    }

    let hash_key = point_hash_key(&id, point.ts);
    let _: () = redis::pipe()
      .hset(&hash_key, "lat", point.lat)
      .hset(&hash_key, "lng", point.lng)
      .hset(&hash_key, "alt", point.altitude)
      .hset(&hash_key, "hdg", point.heading)
      .hset(&hash_key, "gs", point.groundspeed)
      .hset(&hash_key, "ts", point.ts)
      .rpush(&list_key, point.ts)
      .query_async(&mut conn)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;
    Ok(())
  }

  async fn load_track_by_id(&self, id: &str) -> Result<Track, TrackError> {
    let mut conn = self.conn().await?;
    let created_ts: Option<i64> = conn
      .get(created_at_key(id))
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;
    let created_ts = created_ts.ok_or(TrackError::NotFound)?;
    let created_at = timestamp_to_utc(created_ts);

    let tss: Vec<i64> = conn
      .lrange(points_key(id), 0, -1)
      .await
      .map_err(|e| TrackError::Backend(e.to_string()))?;

    let mut track = Track::new(created_at);
    for ts in tss {
      let key = point_hash_key(id, ts);
      track.points.push(load_point(&mut conn, ts, &key).await?);
    }
    Ok(track)
  }

  async fn list_ids(&self) -> Result<Vec<String>, TrackError> {
    let mut conn = self.conn().await?;
    conn.smembers("track_ids").await.map_err(|e| TrackError::Backend(e.to_string()))
  }

  async fn close(&self) -> Result<(), TrackError> {
    Ok(())
  }

  async fn purge_expired(&self, purge_period: chrono::Duration) -> Result<u64, TrackError> {
    let mut conn = self.conn().await?;
    let cutoff = (Utc::now() - purge_period).timestamp();
    let ids: Vec<String> = conn.smembers("track_ids").await.map_err(|e| TrackError::Backend(e.to_string()))?;

    let mut removed = 0u64;
    for id in ids {
      let created_ts: Option<i64> = conn
        .get(created_at_key(&id))
        .await
        .map_err(|e| TrackError::Backend(e.to_string()))?;
      let Some(created_ts) = created_ts else { continue };
      if created_ts >= cutoff {
        continue;
      }

      let list_key = points_key(&id);
      let tss: Vec<i64> = conn.lrange(&list_key, 0, -1).await.map_err(|e| TrackError::Backend(e.to_string()))?;
      let mut pipe = redis::pipe();
      for ts in tss {
        pipe.del(point_hash_key(&id, ts));
      }
      pipe
        .del(&list_key)
        .del(created_at_key(&id))
        .srem("track_ids", &id);
      let _: () = pipe.query_async(&mut conn).await.map_err(|e| TrackError::Backend(e.to_string()))?;
      removed += 1;
    }
    Ok(removed)
  }
}

async fn load_point(conn: &mut redis::aio::Connection, ts: i64, hash_key: &str) -> Result<TrackPoint, TrackError> {
  let (lat, lng, altitude, heading, groundspeed): (f64, f64, i32, i16, i32) = redis::pipe()
    .hget(hash_key, "lat")
    .hget(hash_key, "lng")
    .hget(hash_key, "alt")
    .hget(hash_key, "hdg")
    .hget(hash_key, "gs")
    .query_async(conn)
    .await
    .map_err(|e| TrackError::Backend(e.to_string()))?;
  Ok(TrackPoint {
    lat,
    lng,
    heading,
    altitude,
    groundspeed,
    ts,
  })
}

fn timestamp_to_utc(ts: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}
