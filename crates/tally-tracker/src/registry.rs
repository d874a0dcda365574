//! The closed registry of target adapters, resolved once at construction.

use std::{collections::BTreeMap, fmt, sync::Arc};

use tally_core::{adapter::TargetAdapter, target::TargetKind};

/// One adapter per [`TargetKind`].
#[derive(Clone, Default)]
pub struct AdapterRegistry {
  adapters: BTreeMap<TargetKind, Arc<dyn TargetAdapter>>,
}

impl AdapterRegistry {
  pub fn new() -> Self { Self::default() }

  /// Add `adapter` under the kind it reports. Fails with
  /// [`DuplicateTarget`](tally_core::Error::DuplicateTarget) if that kind is
  /// already taken.
  pub fn register(
    mut self,
    adapter: Arc<dyn TargetAdapter>,
  ) -> tally_core::Result<Self> {
    let kind = adapter.kind();
    if self.adapters.contains_key(&kind) {
      return Err(tally_core::Error::DuplicateTarget(kind));
    }
    self.adapters.insert(kind, adapter);
    Ok(self)
  }

  pub fn get(&self, kind: TargetKind) -> Option<&Arc<dyn TargetAdapter>> {
    self.adapters.get(&kind)
  }

  pub fn contains(&self, kind: TargetKind) -> bool { self.adapters.contains_key(&kind) }

  /// Registered kinds in their natural order.
  pub fn kinds(&self) -> impl Iterator<Item = TargetKind> + '_ {
    self.adapters.keys().copied()
  }
}

impl fmt::Debug for AdapterRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.adapters.keys()).finish()
  }
}
