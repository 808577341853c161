pub mod feed;

use std::collections::HashMap;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::domain::{Airport, Object, Pilot, Radar};
use crate::geoidx::Index;
use crate::track::TrackBackend;
use crate::types::Rect;

#[derive(Debug, Clone)]
pub enum UpstreamEvent {
  SetPilot(Pilot),
  DeletePilot(String),
  SetRadar(Radar),
  DeleteRadar(String),
  SetAirport(Airport),
  DeleteAirport(String),
}

#[derive(Debug)]
pub enum ProviderError {
  PilotNotFound,
  AirportNotFound,
}

impl std::fmt::Display for ProviderError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ProviderError::PilotNotFound => write!(f, "pilot not found"),
      ProviderError::AirportNotFound => write!(f, "airport not found"),
    }
  }
}

impl std::error::Error for ProviderError {}

struct Mappings {
  pilots: HashMap<String, Pilot>,
  airports: HashMap<String, Airport>,
  radars: HashMap<String, Radar>,
}

/// Owns the three in-memory object mappings, the geoidx instance, and the
/// track backend handle; the single writer to the mappings is the loop
/// started by `run`, readers are REST snapshot calls (§4.4).
pub struct Provider {
  mappings: RwLock<Mappings>,
  pub index: Arc<Index>,
  pub tracks: Box<dyn TrackBackend>,
  upstream_tx: mpsc::Sender<UpstreamEvent>,
  upstream_rx: RwLock<Option<mpsc::Receiver<UpstreamEvent>>>,
  stop_tx: watch::Sender<bool>,
  stop_rx: watch::Receiver<bool>,
}

const UPSTREAM_CHANNEL_CAPACITY: usize = 32768;

impl Provider {
  pub fn new(tracks: Box<dyn TrackBackend>) -> Arc<Self> {
    let (tx, rx) = mpsc::channel(UPSTREAM_CHANNEL_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);
    Arc::new(Self {
      mappings: RwLock::new(Mappings {
        pilots: HashMap::new(),
        airports: HashMap::new(),
        radars: HashMap::new(),
      }),
      index: Arc::new(Index::new()),
      tracks,
      upstream_tx: tx,
      upstream_rx: RwLock::new(Some(rx)),
      stop_tx,
      stop_rx,
    })
  }

  pub fn upstream_sender(&self) -> mpsc::Sender<UpstreamEvent> {
    self.upstream_tx.clone()
  }

  /// Signals the provider loop to stop (§4.4 Shutdown). Idempotent: calling
  /// this more than once, or after `run` has already exited, is harmless.
  pub fn stop(&self) {
    let _ = self.stop_tx.send(true);
  }

  /// Consumes upstream set/delete events, drives the index, and maintains
  /// the snapshot mappings. Runs until either the upstream channel closes or
  /// `stop` is called, at which point it drains whatever is left buffered on
  /// the channel before exiting.
  pub async fn run(self: Arc<Self>) {
    let mut rx = self.upstream_rx.write().await.take().expect("Provider::run called once");
    let mut stop_rx = self.stop_rx.clone();
    loop {
      tokio::select! {
        ev = rx.recv() => {
          match ev {
            Some(ev) => self.apply(ev).await,
            None => break,
          }
        }
        _ = stop_rx.changed() => {
          if *stop_rx.borrow() {
            break;
          }
        }
      }
    }
    while let Ok(ev) = rx.try_recv() {
      self.apply(ev).await;
    }
    info!("provider loop exiting");
  }

  async fn apply(&self, ev: UpstreamEvent) {
    match ev {
      UpstreamEvent::SetPilot(pilot) => {
        let bounds = pilot.bounds();
        if let Err(err) = self.tracks.write_track(&pilot).await {
          error!("error writing track for {}: {err}", pilot.callsign);
        }
        self.index.upsert(&pilot.callsign, bounds, Object::Pilot(pilot.clone()));
        self.mappings.write().await.pilots.insert(pilot.callsign.clone(), pilot);
      }
      UpstreamEvent::DeletePilot(callsign) => {
        self.index.delete(&callsign);
        self.mappings.write().await.pilots.remove(&callsign);
      }
      UpstreamEvent::SetRadar(radar) => {
        let bounds = radar.bounds();
        self.index.upsert(&radar.callsign, bounds, Object::Radar(radar.clone()));
        self.mappings.write().await.radars.insert(radar.callsign.clone(), radar);
      }
      UpstreamEvent::DeleteRadar(callsign) => {
        // Bounds sent to the index are irrelevant for a delete-by-id.
        self.index.delete(&callsign);
        self.mappings.write().await.radars.remove(&callsign);
      }
      UpstreamEvent::SetAirport(airport) => {
        let bounds = airport.bounds();
        self.index.upsert(&airport.icao, bounds, Object::Airport(airport.clone()));
        self.mappings.write().await.airports.insert(airport.icao.clone(), airport);
      }
      UpstreamEvent::DeleteAirport(icao) => {
        self.index.delete(&icao);
        self.mappings.write().await.airports.remove(&icao);
      }
    }
  }

  /// Deterministic, key-sorted snapshot of every known pilot.
  pub async fn get_pilots(&self) -> Vec<Pilot> {
    let mappings = self.mappings.read().await;
    let mut keys: Vec<&String> = mappings.pilots.keys().collect();
    keys.sort();
    keys.into_iter().map(|k| mappings.pilots[k].clone()).collect()
  }

  pub async fn get_airports(&self) -> Vec<Airport> {
    let mappings = self.mappings.read().await;
    let mut keys: Vec<&String> = mappings.airports.keys().collect();
    keys.sort();
    keys.into_iter().map(|k| mappings.airports[k].clone()).collect()
  }

  pub async fn get_pilot_by_callsign(&self, callsign: &str) -> Result<Pilot, ProviderError> {
    self
      .mappings
      .read()
      .await
      .pilots
      .get(callsign)
      .cloned()
      .ok_or(ProviderError::PilotNotFound)
  }

  pub async fn get_airport_by_icao(&self, icao: &str) -> Result<Airport, ProviderError> {
    self
      .mappings
      .read()
      .await
      .airports
      .get(icao)
      .cloned()
      .ok_or(ProviderError::AirportNotFound)
  }
}

/// Background task translating upstream HTTP polls into set/delete events on
/// the Provider's upstream channel, diffing against the previously-seen
/// pilot/controller sets (§4.4 Ambient: upstream ingestion).
pub fn spawn_upstream_feed(
  cfg: Arc<Config>,
  provider: Arc<Provider>,
  fir_bounds_rx: tokio::sync::watch::Receiver<HashMap<String, Rect>>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let tx = provider.upstream_sender();
    let mut known_pilots: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut known_radars: std::collections::HashSet<String> = std::collections::HashSet::new();

    loop {
      match feed::poll_once(&cfg).await {
        Ok(snapshot) => {
          let mut fresh_pilots = std::collections::HashSet::new();
          for pilot in snapshot.pilots {
            fresh_pilots.insert(pilot.callsign.clone());
            if tx.try_send(UpstreamEvent::SetPilot(pilot)).is_err() {
              warn!("upstream channel full, dropping pilot set event");
            }
          }
          for gone in known_pilots.difference(&fresh_pilots) {
            if tx.try_send(UpstreamEvent::DeletePilot(gone.clone())).is_err() {
              warn!("upstream channel full, dropping pilot delete event");
            }
          }
          known_pilots = fresh_pilots;

          let fir_bounds = fir_bounds_rx.borrow().clone();
          let mut fresh_radars = std::collections::HashSet::new();
          for ctrl in &snapshot.controllers {
            if let Some(radar) = feed::controller_to_radar(ctrl, &fir_bounds) {
              fresh_radars.insert(radar.callsign.clone());
              if tx.try_send(UpstreamEvent::SetRadar(radar)).is_err() {
                warn!("upstream channel full, dropping radar set event");
              }
            }
          }
          for gone in known_radars.difference(&fresh_radars) {
            if tx.try_send(UpstreamEvent::DeleteRadar(gone.clone())).is_err() {
              warn!("upstream channel full, dropping radar delete event");
            }
          }
          known_radars = fresh_radars;
        }
        Err(err) => feed::log_poll_error(&err),
      }
      tokio::time::sleep(feed::poll_interval(&cfg)).await;
    }
  })
}

const TRACK_PURGE_TICK: std::time::Duration = std::time::Duration::from_secs(300);

/// Periodically drives `TrackBackend::purge_expired` for durable backends.
/// The memory backend runs its own internal GC ticker and ignores this (its
/// `purge_expired` is the trait's no-op default), so this is harmless to run
/// unconditionally regardless of `track.engine`.
pub fn spawn_track_purge(provider: Arc<Provider>, purge_period: chrono::Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(TRACK_PURGE_TICK);
    loop {
      interval.tick().await;
      match provider.tracks.purge_expired(purge_period).await {
        Ok(0) => {}
        Ok(n) => info!("track store: purged {n} expired track(s)"),
        Err(err) => error!("track store purge failed: {err}"),
      }
    }
  })
}

/// Refreshes fixed reference data (airports, FIR bounds) on `data.poll.period`,
/// feeding airport set/delete events through the same upstream channel and
/// handing the freshly parsed FIR bounds table back via `fir_bounds_tx` so
/// the pilot/radar feed task can keep placing controllers correctly.
pub fn spawn_fixed_data_refresh(
  cfg: Arc<Config>,
  provider: Arc<Provider>,
  fir_bounds_tx: tokio::sync::watch::Sender<HashMap<String, Rect>>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let tx = provider.upstream_sender();
    let mut known_airports: std::collections::HashSet<String> = std::collections::HashSet::new();

    loop {
      match crate::fixed::load(None).await {
        Ok(data) => {
          let mut fresh = std::collections::HashSet::new();
          for airport in data.airports {
            fresh.insert(airport.icao.clone());
            if tx.try_send(UpstreamEvent::SetAirport(airport)).is_err() {
              warn!("upstream channel full, dropping airport set event");
            }
          }
          for gone in known_airports.difference(&fresh) {
            if tx.try_send(UpstreamEvent::DeleteAirport(gone.clone())).is_err() {
              warn!("upstream channel full, dropping airport delete event");
            }
          }
          known_airports = fresh;
          let _ = fir_bounds_tx.send(data.fir_bounds);
        }
        Err(err) => error!("runtime fixed-data refresh failed: {err}"),
      }
      tokio::time::sleep(cfg.data.poll.period).await;
    }
  })
}
