use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::Deserialize;

use crate::config::Config;
use crate::domain::{Airport, FlightPlan, Pilot, Radar};
use crate::types::Point;

/// Wire shapes for the upstream JSON feed (a VATSIM-network-style snapshot:
/// top-level `pilots`/`controllers` arrays refreshed wholesale every poll).
#[derive(Debug, Deserialize)]
struct WireFlightPlan {
  flight_rules: String,
  aircraft: String,
  departure: String,
  arrival: String,
  alternate: String,
  cruise_tas: String,
  altitude: String,
  deptime: String,
  enroute_time: String,
  fuel_time: String,
  remarks: String,
  route: String,
}

#[derive(Debug, Deserialize)]
struct WirePilot {
  cid: u64,
  name: String,
  callsign: String,
  server: String,
  pilot_rating: i32,
  latitude: f64,
  longitude: f64,
  altitude: i32,
  groundspeed: i32,
  heading: i16,
  transponder: String,
  qnh_i_hg: f64,
  qnh_mb: i16,
  flight_plan: Option<WireFlightPlan>,
  logon_time: DateTime<Utc>,
  last_updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireController {
  cid: u64,
  callsign: String,
  name: String,
  frequency: String,
  facility: i8,
  rating: i32,
  logon_time: DateTime<Utc>,
  last_updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WireSnapshot {
  pilots: Vec<WirePilot>,
  controllers: Vec<WireController>,
}

pub struct Snapshot {
  pub pilots: Vec<Pilot>,
  pub controllers: Vec<WireController>,
}

impl From<WirePilot> for Pilot {
  fn from(w: WirePilot) -> Self {
    Pilot {
      cid: w.cid,
      name: w.name,
      callsign: w.callsign,
      server: w.server,
      pilot_rating: w.pilot_rating,
      position: Point {
        lat: w.latitude,
        lng: w.longitude,
      },
      altitude: w.altitude,
      groundspeed: w.groundspeed,
      heading: w.heading,
      transponder: w.transponder,
      qnh_i_hg: (w.qnh_i_hg * 100.0).round() as u16,
      qnh_mb: w.qnh_mb as u16,
      flight_plan: w.flight_plan.map(|fp| FlightPlan {
        flight_rules: crate::domain::pilot::normalise_flight_rules(&fp.flight_rules).unwrap_or(fp.flight_rules),
        aircraft: fp.aircraft,
        departure: fp.departure,
        arrival: fp.arrival,
        alternate: fp.alternate,
        cruise_tas: fp.cruise_tas.parse().unwrap_or(0),
        altitude: fp.altitude.parse().unwrap_or(0),
        deptime: fp.deptime,
        enroute_time: fp.enroute_time,
        fuel_time: fp.fuel_time,
        remarks: fp.remarks,
        route: fp.route,
      }),
      logon_time: w.logon_time,
      last_updated: w.last_updated,
    }
  }
}

/// Matches a controller callsign's FIR prefix (e.g. `EGTT_CTR` -> `EGTT`)
/// against the fixed-data FIR bounds table to build a Radar object. Unmatched
/// controllers are skipped: without a known FIR we cannot place them.
pub fn controller_to_radar(ctrl: &WireController, fir_bounds: &std::collections::HashMap<String, crate::types::Rect>) -> Option<Radar> {
  let prefix = ctrl.callsign.split('_').next().unwrap_or(&ctrl.callsign);
  let bounds = fir_bounds.get(prefix)?;
  let mut radar = crate::fixed::radar_for_fir(prefix, bounds);
  radar.cid = ctrl.cid;
  radar.name = ctrl.name.clone();
  radar.frequency = ctrl.frequency.clone();
  radar.facility = ctrl.facility;
  radar.rating = ctrl.rating;
  radar.logon_time = ctrl.logon_time;
  radar.last_updated = ctrl.last_updated;
  Some(radar)
}

#[derive(Debug)]
pub enum FeedError {
  Request(String),
  Decode(String),
}

impl std::fmt::Display for FeedError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FeedError::Request(msg) => write!(f, "upstream feed request failed: {msg}"),
      FeedError::Decode(msg) => write!(f, "upstream feed decode failed: {msg}"),
    }
  }
}

impl std::error::Error for FeedError {}

pub async fn poll_once(cfg: &Config) -> Result<Snapshot, FeedError> {
  let client = reqwest::Client::builder()
    .timeout(cfg.api.poll.timeout)
    .build()
    .map_err(|e| FeedError::Request(e.to_string()))?;
  let resp = client
    .get(&cfg.api.url)
    .send()
    .await
    .map_err(|e| FeedError::Request(e.to_string()))?;
  let data: WireSnapshot = resp.json().await.map_err(|e| FeedError::Decode(e.to_string()))?;
  Ok(Snapshot {
    pilots: data.pilots.into_iter().map(Pilot::from).collect(),
    controllers: data.controllers,
  })
}

/// Boot-time retry policy (§4.4 ambient ingestion): try `retries` times with
/// `retry_cooldown` between attempts, returning the first success.
pub async fn poll_with_boot_retries(cfg: &Config) -> Result<Snapshot, FeedError> {
  let mut last_err = None;
  for attempt in 1..=cfg.api.boot.retries.max(1) {
    match poll_once(cfg).await {
      Ok(snap) => return Ok(snap),
      Err(err) => {
        warn!("boot-time upstream poll attempt {attempt} failed: {err}");
        last_err = Some(err);
        if attempt < cfg.api.boot.retries {
          tokio::time::sleep(cfg.api.boot.retry_cooldown).await;
        }
      }
    }
  }
  Err(last_err.unwrap_or(FeedError::Request("no attempts made".into())))
}

/// Also loads the fixed airport/FIR reference data at boot, so the Provider
/// can place controllers against FIR bounds from the very first pilot poll.
pub async fn load_fixed_with_boot_retries(cfg: &Config) -> Result<crate::fixed::FixedData, FeedError> {
  let mut last_err = None;
  for attempt in 1..=cfg.api.boot.retries.max(1) {
    match crate::fixed::load(None).await {
      Ok(data) => return Ok(data),
      Err(err) => {
        warn!("boot-time fixed-data load attempt {attempt} failed: {err}");
        last_err = Some(err.to_string());
        if attempt < cfg.api.boot.retries {
          tokio::time::sleep(cfg.api.boot.retry_cooldown).await;
        }
      }
    }
  }
  Err(FeedError::Request(last_err.unwrap_or_default()))
}

pub fn poll_interval(cfg: &Config) -> Duration {
  cfg.api.poll.period
}

pub fn log_poll_error(err: &FeedError) {
  error!("runtime upstream poll failed: {err}");
}
