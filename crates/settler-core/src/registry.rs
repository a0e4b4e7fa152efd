//! The in-flight registry: the set of intent IDs currently claimed by
//! the pipeline (spec §4.2).
//!
//! Grounded on `crates/core/src/position_tracker.rs`'s use of
//! `DashMap`/`DashSet` for lock-free-ish concurrent membership under
//! simultaneous Producer/Worker access.

use dashmap::DashSet;

pub struct InFlightRegistry {
    ids: DashSet<String>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self {
            ids: DashSet::new(),
        }
    }

    /// Atomically adds any of `ids` not already present, returning the
    /// subset that was newly added. IDs already in the registry are
    /// silently ignored (a worker is already handling them).
    pub fn claim(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter(|id| self.ids.insert((*id).clone()))
            .cloned()
            .collect()
    }

    pub fn release(&self, id: &str) {
        self.ids.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}
