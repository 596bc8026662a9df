//! On-disk state for WakePoint: saved destinations and alert settings,
//! both kept in one JSON key-value file.

pub mod destinations;
mod error;
pub mod kv;
pub mod settings;

pub use destinations::{DestinationStore, SavedDestination};
pub use error::{Result, StoreError};
pub use kv::KvStore;
pub use settings::SettingsStore;
