pub mod spatial;
pub mod subscription;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rstar::RTree;
use tokio::sync::mpsc;

use crate::domain::{Object, ObjectKind};
use crate::types::Rect;

use spatial::SpatialEntry;
pub use subscription::{Filter, Subscription};

pub type SubId = u64;

#[derive(Debug, Clone)]
pub enum Event {
  Set(Object),
  Delete { id: String, kind: ObjectKind },
}

#[derive(Debug)]
pub enum GeoIdxError {
  MalformedBounds,
  UnknownSubscription,
}

impl fmt::Display for GeoIdxError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GeoIdxError::MalformedBounds => write!(f, "bounds have min > max"),
      GeoIdxError::UnknownSubscription => write!(f, "subscription does not exist"),
    }
  }
}

impl std::error::Error for GeoIdxError {}

struct SubEntry {
  viewport: Rect,
  filters: Vec<Filter>,
  last_visible: HashSet<String>,
  sender: mpsc::Sender<Event>,
}

impl SubEntry {
  fn visible(&self, obj: &Object) -> bool {
    obj.bounds().intersects(&self.viewport) && self.filters.iter().all(|p| p(obj))
  }
}

struct IndexInner {
  objects: HashMap<String, (Rect, Object)>,
  tree: RTree<SpatialEntry>,
  subs: HashMap<SubId, SubEntry>,
  drops: u64,
}

/// The geospatial index: a mutable id -> (rect, payload) store that fans
/// out per-subscriber set/delete events as objects move in and out of each
/// subscriber's viewport and predicate set.
///
/// Mutation is synchronous and single-threaded behind one mutex: the whole
/// recompute-and-fanout for one `upsert`/`delete` happens while the lock is
/// held, which is what gives each subscription's outCh its per-object FIFO
/// ordering guarantee for free.
pub struct Index {
  inner: Mutex<IndexInner>,
  next_sub_id: AtomicU64,
}

impl Default for Index {
  fn default() -> Self {
    Self::new()
  }
}

impl Index {
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(IndexInner {
        objects: HashMap::new(),
        tree: RTree::new(),
        subs: HashMap::new(),
        drops: 0,
      }),
      next_sub_id: AtomicU64::new(1),
    }
  }

  /// Total count of subscriber-channel drops due to backpressure, across all
  /// subscriptions ever created. Monotonic, for metrics/logging only.
  pub fn dropped_events(&self) -> u64 {
    self.inner.lock().unwrap().drops
  }

  pub fn upsert(&self, id: &str, bounds: Rect, value: Object) {
    if bounds.is_malformed() {
      log::warn!("rejecting upsert of {id}: malformed bounds");
      return;
    }
    let mut inner = self.inner.lock().unwrap();

    if let Some((old_bounds, old_value)) = inner.objects.get(id) {
      if *old_bounds == bounds && *old_value == value {
        return; // bit-identical no-op upsert: never touches a subscription
      }
    }

    let old_bounds = inner.objects.get(id).map(|(r, _)| *r);
    if old_bounds != Some(bounds) {
      if old_bounds.is_some() {
        inner.tree.remove(&SpatialEntry {
          id: id.to_owned(),
          rect: old_bounds.unwrap(),
        });
      }
      inner.tree.insert(SpatialEntry {
        id: id.to_owned(),
        rect: bounds,
      });
    }
    inner.objects.insert(id.to_owned(), (bounds, value.clone()));

    let sub_ids: Vec<SubId> = inner.subs.keys().copied().collect();
    let IndexInner { subs, drops, .. } = &mut *inner;
    for sid in sub_ids {
      let sub = subs.get_mut(&sid).unwrap();
      let was_visible = sub.last_visible.contains(id);
      let visible_now = sub.visible(&value);
      match (was_visible, visible_now) {
        (false, false) => {}
        (false, true) => {
          sub.last_visible.insert(id.to_owned());
          Self::send_or_drop(sub, drops, Event::Set(value.clone()));
        }
        (true, true) => {
          Self::send_or_drop(sub, drops, Event::Set(value.clone()));
        }
        (true, false) => {
          sub.last_visible.remove(id);
          Self::send_or_drop(
            sub,
            drops,
            Event::Delete {
              id: id.to_owned(),
              kind: value.kind(),
            },
          );
        }
      }
    }
  }

  pub fn delete(&self, id: &str) {
    let mut inner = self.inner.lock().unwrap();
    let Some((bounds, value)) = inner.objects.remove(id) else {
      return; // unknown id: silent no-op
    };
    if !bounds.is_zero() {
      inner.tree.remove(&SpatialEntry {
        id: id.to_owned(),
        rect: bounds,
      });
    }

    let kind = value.kind();
    let sub_ids: Vec<SubId> = inner.subs.keys().copied().collect();
    let IndexInner { subs, drops, .. } = &mut *inner;
    for sid in sub_ids {
      let sub = subs.get_mut(&sid).unwrap();
      if sub.last_visible.remove(id) {
        Self::send_or_drop(
          sub,
          drops,
          Event::Delete {
            id: id.to_owned(),
            kind,
          },
        );
      }
    }
  }

  fn send_or_drop(sub: &mut SubEntry, drops: &mut u64, ev: Event) {
    if sub.sender.try_send(ev).is_err() {
      *drops += 1;
    }
  }

  pub fn subscribe(self: &std::sync::Arc<Self>, ch_cap: usize) -> (Subscription, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(ch_cap.max(1));
    let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
    let mut inner = self.inner.lock().unwrap();
    inner.subs.insert(
      id,
      SubEntry {
        viewport: Rect::ZERO,
        filters: Vec::new(),
        last_visible: HashSet::new(),
        sender: tx,
      },
    );
    (
      Subscription {
        id,
        index: self.clone(),
      },
      rx,
    )
  }

  pub fn unsubscribe(&self, id: SubId) {
    self.inner.lock().unwrap().subs.remove(&id);
  }

  pub fn set_bounds(&self, id: SubId, viewport: Rect) -> Result<(), GeoIdxError> {
    if viewport.is_malformed() {
      return Err(GeoIdxError::MalformedBounds);
    }
    let mut inner = self.inner.lock().unwrap();
    if !inner.subs.contains_key(&id) {
      return Err(GeoIdxError::UnknownSubscription);
    }
    inner.subs.get_mut(&id).unwrap().viewport = viewport;
    self.diff_pass(&mut inner, id);
    Ok(())
  }

  pub fn set_filters(&self, id: SubId, filters: Vec<Filter>) -> Result<(), GeoIdxError> {
    let mut inner = self.inner.lock().unwrap();
    if !inner.subs.contains_key(&id) {
      return Err(GeoIdxError::UnknownSubscription);
    }
    inner.subs.get_mut(&id).unwrap().filters = filters;
    self.diff_pass(&mut inner, id);
    Ok(())
  }

  /// Recomputes the full visible set for subscription `id` against every
  /// object currently in the index and emits the symmetric difference
  /// against `last_visible`. Used after a viewport or predicate change; it
  /// is the only mechanism by which a client sees state after changing its
  /// view (§4.1).
  fn diff_pass(&self, inner: &mut IndexInner, id: SubId) {
    let viewport = inner.subs[&id].viewport;
    let candidate_ids: HashSet<String> = if viewport.is_zero() {
      HashSet::new()
    } else {
      viewport
        .envelopes()
        .iter()
        .flat_map(|env| inner.tree.locate_in_envelope_intersecting(env))
        .map(|e| e.id.clone())
        .collect()
    };

    let mut new_visible = HashSet::new();
    {
      let sub = &inner.subs[&id];
      for cand in &candidate_ids {
        if let Some((_, value)) = inner.objects.get(cand) {
          if sub.visible(value) {
            new_visible.insert(cand.clone());
          }
        }
      }
    }

    let to_delete: Vec<String> = inner.subs[&id]
      .last_visible
      .difference(&new_visible)
      .cloned()
      .collect();
    let to_set: Vec<String> = new_visible
      .difference(&inner.subs[&id].last_visible)
      .cloned()
      .collect();

    let sub = inner.subs.get_mut(&id).unwrap();
    for del_id in &to_delete {
      // kind is best-effort here: the object may already be gone from the
      // map if this diff pass follows a delete; fall back to Pilot, the
      // commonest kind, since only the id matters on the wire.
      let kind = inner
        .objects
        .get(del_id)
        .map(|(_, v)| v.kind())
        .unwrap_or(ObjectKind::Pilot);
      sub.last_visible.remove(del_id);
      Self::send_or_drop(
        sub,
        &mut inner.drops,
        Event::Delete {
          id: del_id.clone(),
          kind,
        },
      );
    }
    // note: `inner.objects` borrow above must end before we touch inner.drops via sub again
    let sub = inner.subs.get_mut(&id).unwrap();
    for set_id in &to_set {
      if let Some((_, value)) = inner.objects.get(set_id) {
        sub.last_visible.insert(set_id.clone());
        Self::send_or_drop(sub, &mut inner.drops, Event::Set(value.clone()));
      }
    }
  }
}
