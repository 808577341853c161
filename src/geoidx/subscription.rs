use std::sync::Arc;

use crate::domain::Object;
use crate::types::Rect;

use super::{GeoIdxError, Index, SubId};

/// A boolean predicate over an index object. `Arc` so a subscription layer
/// can compose several predicates (airport filter, pilot filter) and swap
/// the whole set atomically without cloning the closures.
pub type Filter = Arc<dyn Fn(&Object) -> bool + Send + Sync>;

/// A lightweight handle to a registered subscription inside the index. The
/// actual visibility state (`last_visible`, viewport, filters) lives in the
/// index; this handle only carries the id and a reference back to it.
pub struct Subscription {
  pub(crate) id: SubId,
  pub(crate) index: Arc<Index>,
}

impl Subscription {
  pub fn set_bounds(&self, viewport: Rect) -> Result<(), GeoIdxError> {
    self.index.set_bounds(self.id, viewport)
  }

  pub fn set_filters(&self, filters: Vec<Filter>) -> Result<(), GeoIdxError> {
    self.index.set_filters(self.id, filters)
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.index.unsubscribe(self.id);
  }
}
