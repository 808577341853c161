pub mod pagination;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::Config;
use crate::domain::Pilot;
use crate::provider::{Provider, ProviderError};
use crate::session::ws_handler;
use crate::track::Track;

use pagination::{paginate, PageQuery};

#[derive(Serialize)]
struct ErrorBody {
  error: String,
}

fn not_found(msg: impl Into<String>) -> Response {
  (StatusCode::NOT_FOUND, Json(ErrorBody { error: msg.into() })).into_response()
}

impl From<ProviderError> for Response {
  fn from(err: ProviderError) -> Self {
    match err {
      ProviderError::PilotNotFound => not_found("pilot not found"),
      ProviderError::AirportNotFound => not_found("airport not found"),
    }
  }
}

async fn list_pilots(State(provider): State<Arc<Provider>>, Query(q): Query<PageQuery>) -> impl IntoResponse {
  let pilots = provider.get_pilots().await;
  Json(paginate(&pilots, &q))
}

#[derive(Serialize)]
struct PilotWithTrack {
  #[serde(flatten)]
  pilot: Pilot,
  track: Vec<crate::track::TrackPoint>,
}

async fn get_pilot(State(provider): State<Arc<Provider>>, Path(callsign): Path<String>) -> Response {
  let pilot = match provider.get_pilot_by_callsign(&callsign).await {
    Ok(p) => p,
    Err(err) => return err.into(),
  };
  let track: Track = provider
    .tracks
    .load_track(&pilot)
    .await
    .unwrap_or_else(|_| Track::new(pilot.logon_time));
  Json(PilotWithTrack {
    pilot,
    track: track.points,
  })
  .into_response()
}

async fn list_airports(State(provider): State<Arc<Provider>>, Query(q): Query<PageQuery>) -> impl IntoResponse {
  let airports = provider.get_airports().await;
  Json(paginate(&airports, &q))
}

async fn get_airport(State(provider): State<Arc<Provider>>, Path(icao): Path<String>) -> Response {
  match provider.get_airport_by_icao(&icao).await {
    Ok(a) => Json(a).into_response(),
    Err(err) => err.into(),
  }
}

async fn debug_build() -> impl IntoResponse {
  let body = format!(
    "{} {}\nrustc target: {}\n",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_VERSION"),
    std::env::consts::ARCH,
  );
  ([("content-type", "text/plain")], body)
}

pub fn router(provider: Arc<Provider>, cfg: &Config) -> Router {
  let mut router = Router::new()
    .route("/api/updates", get(ws_handler))
    .route("/api/pilots", get(list_pilots))
    .route("/api/pilots/:callsign", get(get_pilot))
    .route("/api/airports", get(list_airports))
    .route("/api/airports/:icao", get(get_airport))
    .route("/debug/build", get(debug_build))
    .with_state(provider);

  if cfg.web.cors {
    // Mirror the request's Origin back rather than a wildcard or credentialed
    // allow-list; no Access-Control-Allow-Credentials header is ever set.
    router = router.layer(CorsLayer::new().allow_origin(AllowOrigin::mirror_request()));
  }
  router
}
