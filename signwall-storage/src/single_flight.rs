//! Per-key single-flight guard.
//!
//! At most one holder per key. Callers that must have a result wait on
//! [`SingleFlight::acquire`] and re-read the cache once they hold the guard;
//! background refreshes use [`SingleFlight::try_acquire`] and skip when a
//! flight is already running.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held while a regeneration for one key is in progress.
pub struct FlightGuard {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Default)]
pub struct SingleFlight {
    flights: DashMap<String, Arc<Mutex<()>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        self.flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait until no other flight for `key` is running, then lead one.
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let slot = self.slot(key);
        FlightGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Lead a flight for `key` only if none is running.
    pub fn try_acquire(&self, key: &str) -> Option<FlightGuard> {
        let slot = self.slot(key);
        slot.try_lock_owned()
            .ok()
            .map(|guard| FlightGuard { _guard: guard })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.flights
            .get(key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }
}
