use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// JSON object file used as a flat key-value store.
///
/// The whole file is read on open and rewritten on every `set`; writes go to a
/// sibling `.tmp` file first and are renamed into place.
#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    values: Map<String, Value>,
    loaded_mtime: Option<SystemTime>,
}

impl KvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self { path, values: Map::new(), loaded_mtime: None };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file. A missing file is an empty store.
    pub fn reload(&mut self) -> Result<()> {
        if !self.path.exists() {
            self.values.clear();
            self.loaded_mtime = None;
            return Ok(());
        }
        let raw = fs::read(&self.path).map_err(|e| self.io_err(e))?;
        self.values = match serde_json::from_slice::<Value>(&raw)? {
            Value::Object(m) => m,
            _ => return Err(StoreError::NotAnObject(self.path.display().to_string())),
        };
        self.loaded_mtime = self.current_mtime();
        debug!("kv: loaded {} key(s) from {}", self.values.len(), self.path.display());
        Ok(())
    }

    /// True when the file on disk differs from what was last loaded or written.
    pub fn changed_on_disk(&self) -> bool {
        self.current_mtime() != self.loaded_mtime
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<std::result::Result<T, serde_json::Error>> {
        self.values.get(key).map(|v| T::deserialize(v))
    }

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Updates the in-memory value, then persists. The in-memory value stays
    /// even when persisting fails.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let v = serde_json::to_value(value)?;
        // pick up other writers' keys first, last writer wins per key
        if self.changed_on_disk() {
            if let Err(e) = self.reload() {
                warn!("kv: could not merge {} before write: {}", self.path.display(), e);
            }
        }
        self.values.insert(key.to_string(), v);
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let body = serde_json::to_vec_pretty(&self.values)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
            f.write_all(&body).map_err(|e| self.io_err(e))?;
            f.flush().map_err(|e| self.io_err(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        self.loaded_mtime = self.current_mtime();
        Ok(())
    }

    fn current_mtime(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io { path: self.path.display().to_string(), source }
    }
}
