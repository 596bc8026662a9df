use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wake_nav::engine::{Address, Target};
use wake_nav::Coordinate;

use crate::error::Result;
use crate::kv::KvStore;

pub const SAVED_DESTINATIONS_KEY: &str = "SavedDestinations";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDestination {
    pub id: String,
    pub coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl SavedDestination {
    pub fn new(coordinate: Coordinate, name: Option<String>) -> Self {
        Self { id: new_id(), coordinate, name, address: None }
    }

    pub fn to_target(&self) -> Target {
        Target {
            coord: self.coordinate,
            name: self.name.clone().or_else(|| self.address.as_ref().and_then(|a| a.name.clone())),
            address: self.address.clone(),
        }
    }
}

fn new_id() -> String {
    let mut b = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut b);
    hex::encode(b)
}

/// Ordered list of saved destinations, persisted under one key.
///
/// Mutations are applied in memory first; a failed write is logged and
/// returned but not rolled back.
#[derive(Debug)]
pub struct DestinationStore {
    kv: KvStore,
    items: Vec<SavedDestination>,
}

impl DestinationStore {
    pub fn new(kv: KvStore) -> Self {
        let items = match kv.get::<Vec<SavedDestination>>(SAVED_DESTINATIONS_KEY) {
            None => Vec::new(),
            Some(Ok(v)) => v,
            Some(Err(e)) => {
                warn!("destinations: failed to decode saved list, starting empty: {}", e);
                Vec::new()
            }
        };
        Self { kv, items }
    }

    pub fn load_all(&self) -> &[SavedDestination] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&SavedDestination> {
        self.items.iter().find(|d| d.id == id)
    }

    pub fn save(&mut self, destination: SavedDestination) -> Result<()> {
        info!("destinations: saved {}", destination.id);
        self.items.push(destination);
        self.persist("save")
    }

    /// Removes the entry with `id`. Unknown ids are a no-op.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(idx) = self.items.iter().position(|d| d.id == id) else {
            return Ok(false);
        };
        self.items.remove(idx);
        info!("destinations: deleted {}", id);
        self.persist("delete").map(|_| true)
    }

    /// Sets the display name of the entry with `id`. Unknown ids are a no-op.
    pub fn rename(&mut self, id: &str, name: &str) -> Result<bool> {
        let Some(d) = self.items.iter_mut().find(|d| d.id == id) else {
            return Ok(false);
        };
        d.name = Some(name.to_string());
        info!("destinations: renamed {} to {:?}", id, name);
        self.persist("rename").map(|_| true)
    }

    fn persist(&mut self, op: &str) -> Result<()> {
        self.kv.set(SAVED_DESTINATIONS_KEY, &self.items).map_err(|e| {
            warn!("destinations: failed to persist after {}: {}", op, e);
            e
        })
    }
}
