//! Per-target serialization for incident processing (§5).
//!
//! The incident engine must be safe against concurrent invocations for
//! different targets while serializing processing per target. Rather than
//! reach for an actor framework, this keys a `tokio::sync::Mutex` per
//! target id behind an outer `RwLock`-guarded map, the same
//! `Arc`-sharing idiom the rest of this codebase uses for shared state.

use crate::state::IncidentState;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// A registry of per-target incident state, each guarded by its own lock.
pub struct IncidentRegistry<K> {
    states: RwLock<HashMap<K, Arc<Mutex<IncidentState>>>>,
}

impl<K> IncidentRegistry<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Locks the given target's state, inserting a fresh [`IncidentState`]
    /// if this is the first time the target has been seen.
    pub async fn lock(&self, target_id: K) -> OwnedIncidentGuard {
        let existing = {
            let read = self.states.read().await;
            read.get(&target_id).cloned()
        };

        let entry = match existing {
            Some(entry) => entry,
            None => {
                let mut write = self.states.write().await;
                write
                    .entry(target_id)
                    .or_insert_with(|| Arc::new(Mutex::new(IncidentState::new())))
                    .clone()
            }
        };

        OwnedIncidentGuard { entry }
    }

    /// Drops bookkeeping for targets no longer present, called after the
    /// scheduler refreshes its target list each tick.
    pub async fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        let mut write = self.states.write().await;
        write.retain(|k, _| keep(k));
    }
}

impl<K> Default for IncidentRegistry<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the `Arc` alive long enough to hand back a live [`MutexGuard`].
pub struct OwnedIncidentGuard {
    entry: Arc<Mutex<IncidentState>>,
}

impl OwnedIncidentGuard {
    /// Awaits the per-target lock and returns a guard to mutate the state.
    pub async fn state(&self) -> MutexGuard<'_, IncidentState> {
        self.entry.lock().await
    }
}
