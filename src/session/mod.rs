pub mod subscription;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Object;
use crate::geoidx::Event;
use crate::provider::Provider;
use crate::types::Rect;

use subscription::ClientSubscription;

const MAX_OBJECTS_PER_UPDATE: usize = 1500;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const OUTBOUND_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
  id: String,
  #[serde(rename = "type")]
  kind: String,
  payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
enum OutboundEnvelope {
  #[serde(rename = "update")]
  Update(UpdatePayload),
  #[serde(rename = "status")]
  Status { id: String, status: &'static str },
  #[serde(rename = "error")]
  Error { id: String, error: String },
}

#[derive(Debug, Serialize)]
struct UpdatePayload {
  e_type: &'static str,
  o_type: &'static str,
  objects: Vec<EventObject>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EventObject {
  Full(Object),
  Id(String),
}

#[derive(Deserialize)]
struct AirportFilterPayload {
  include_uncontrolled: bool,
}

#[derive(Deserialize)]
struct PilotFilterPayload {
  query: String,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(provider): State<Arc<Provider>>) -> impl IntoResponse {
  ws.on_upgrade(move |socket| handle_socket(socket, provider))
}

async fn handle_socket(socket: WebSocket, provider: Arc<Provider>) {
  let (idx_sub, mut events) = provider.index.subscribe(OUTBOUND_CHANNEL_CAPACITY);
  let client_sub = Arc::new(ClientSubscription::new(idx_sub));

  let (mut ws_tx, mut ws_rx) = socket.split();
  let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<OutboundEnvelope>(OUTBOUND_CHANNEL_CAPACITY);

  let reader_sub = client_sub.clone();
  let reader_out = out_tx.clone();
  let reader = tokio::spawn(async move {
    while let Some(Ok(msg)) = ws_rx.next().await {
      let Message::Text(text) = msg else { continue };
      handle_inbound(&text, &reader_sub, &reader_out).await;
    }
  });

  let writer = tokio::spawn(async move {
    let mut acc: Option<Accumulator> = None;
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    loop {
      tokio::select! {
        ev = events.recv() => {
          match ev {
            Some(ev) => {
              let (e_type, o_type, obj) = split_event(ev);
              acc = push_event(acc, e_type, o_type, obj, &mut ws_tx).await;
            }
            None => break,
          }
        }
        _ = ticker.tick() => {
          if let Some(a) = acc.take() {
            send_update(&mut ws_tx, a).await;
          }
        }
        env = out_rx.recv() => {
          match env {
            Some(env) => {
              if send_envelope(&mut ws_tx, &env).await.is_err() {
                break;
              }
            }
            None => break,
          }
        }
      }
    }
    if let Some(a) = acc.take() {
      send_update(&mut ws_tx, a).await;
    }
  });

  let _ = reader.await;
  // Drop our own handles to the subscription and the outbound channel so the
  // writer's select loop sees both sides close and reaches its `None` arms,
  // letting it flush its final accumulator and exit on its own rather than
  // being torn down mid-batch.
  drop(client_sub);
  drop(out_tx);
  let _ = writer.await;
  debug!("session closed");
}

struct Accumulator {
  e_type: &'static str,
  o_type: &'static str,
  objects: Vec<EventObject>,
}

fn split_event(ev: Event) -> (&'static str, &'static str, EventObject) {
  match ev {
    Event::Set(obj) => ("set", obj.kind().wire_code(), EventObject::Full(obj)),
    Event::Delete { id, kind } => ("del", kind.wire_code(), EventObject::Id(id)),
  }
}

async fn push_event(
  acc: Option<Accumulator>,
  e_type: &'static str,
  o_type: &'static str,
  obj: EventObject,
  ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> Option<Accumulator> {
  let mut acc = match acc {
    Some(a) if a.e_type == e_type && a.o_type == o_type => a,
    Some(a) => {
      send_update(ws_tx, a).await;
      Accumulator { e_type, o_type, objects: Vec::new() }
    }
    None => Accumulator { e_type, o_type, objects: Vec::new() },
  };
  acc.objects.push(obj);
  if acc.objects.len() >= MAX_OBJECTS_PER_UPDATE {
    send_update(ws_tx, acc).await;
    return None;
  }
  Some(acc)
}

async fn send_update(ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>, acc: Accumulator) {
  let env = OutboundEnvelope::Update(UpdatePayload {
    e_type: acc.e_type,
    o_type: acc.o_type,
    objects: acc.objects,
  });
  let _ = send_envelope(ws_tx, &env).await;
}

async fn send_envelope(
  ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
  env: &OutboundEnvelope,
) -> Result<(), ()> {
  let text = match serde_json::to_string(env) {
    Ok(t) => t,
    Err(err) => {
      warn!("failed to encode outbound envelope: {err}");
      return Err(());
    }
  };
  ws_tx.send(Message::Text(text)).await.map_err(|_| ())
}

async fn handle_inbound(text: &str, sub: &Arc<ClientSubscription>, out: &tokio::sync::mpsc::Sender<OutboundEnvelope>) {
  let env: InboundEnvelope = match serde_json::from_str(text) {
    Ok(env) => env,
    Err(err) => {
      let _ = out
        .send(OutboundEnvelope::Error {
          id: String::new(),
          error: format!("malformed envelope: {err}"),
        })
        .await;
      return;
    }
  };

  let result = match env.kind.as_str() {
    "bounds" => serde_json::from_value::<Rect>(env.payload)
      .map_err(|e| e.to_string())
      .and_then(|r| sub.set_bounds(r).map_err(|e| e.to_string())),
    "airport_filter" => serde_json::from_value::<AirportFilterPayload>(env.payload)
      .map_err(|e| e.to_string())
      .and_then(|p| sub.set_airport_filter(p.include_uncontrolled).map_err(|e| e.to_string())),
    "pilot_filter" => serde_json::from_value::<PilotFilterPayload>(env.payload)
      .map_err(|e| e.to_string())
      .and_then(|p| sub.set_pilot_filter(&p.query).map_err(|e| e.to_string())),
    "sub_id" | "unsub_id" => {
      let _ = out
        .send(OutboundEnvelope::Status {
          id: env.id,
          status: "noop",
        })
        .await;
      return;
    }
    other => Err(format!("unknown request type {other:?}")),
  };

  match result {
    Ok(()) => {
      let _ = out
        .send(OutboundEnvelope::Status {
          id: env.id,
          status: "ok",
        })
        .await;
    }
    Err(msg) => {
      let _ = out.send(OutboundEnvelope::Error { id: env.id, error: msg }).await;
    }
  }
}
