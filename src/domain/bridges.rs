//! Registry of the bridges currently open to one backend.
//!
//! Every mutation happens under a single mutex, and no operation holds it
//! while doing I/O: [`Bridges::remove_and_close_all`] swaps the whole set
//! out first and closes the members afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::bridge::{Bridge, BridgeFactory, BridgeId};
use super::BoxConn;
use crate::error::SwitchboardError;

pub struct Bridges {
    factory: Arc<dyn BridgeFactory>,
    members: Mutex<HashMap<BridgeId, Arc<dyn Bridge>>>,
}

impl Bridges {
    #[must_use]
    pub fn new(factory: Arc<dyn BridgeFactory>) -> Self {
        Self {
            factory,
            members: Mutex::new(HashMap::new()),
        }
    }

    fn members(&self) -> MutexGuard<'_, HashMap<BridgeId, Arc<dyn Bridge>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build and register a bridge without starting it.
    pub fn create(&self, client: BoxConn, backend: BoxConn) -> Arc<dyn Bridge> {
        let bridge = self.factory.create(client, backend);
        self.members().insert(bridge.id(), Arc::clone(&bridge));
        bridge
    }

    pub fn remove(&self, bridge: &Arc<dyn Bridge>) -> Result<(), SwitchboardError> {
        let id = bridge.id();
        self.members()
            .remove(&id)
            .map(drop)
            .ok_or(SwitchboardError::BridgeNotFound(id))
    }

    pub fn remove_and_close_all(&self) {
        let drained = std::mem::take(&mut *self.members());
        for bridge in drained.into_values() {
            bridge.close();
        }
    }

    #[must_use]
    pub fn contains(&self, bridge: &Arc<dyn Bridge>) -> bool {
        self.members().contains_key(&bridge.id())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.members().len()
    }
}

impl std::fmt::Debug for Bridges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridges").field("size", &self.size()).finish()
    }
}
