use std::sync::Mutex;

use tracing::{debug, warn};
use wake_nav::policy::{AlertDuration, AlertModality, AlertPolicy, PolicySource, Radius};

use crate::error::Result;
use crate::kv::KvStore;

pub const RADIUS_KEY: &str = "CircleDistance";
pub const DURATION_KEY: &str = "VibrateSeconds";
pub const MODALITY_KEY: &str = "AlertModality";

/// Alert settings backed by the key-value file.
///
/// Values that are missing or outside the allowed sets fall back to the
/// defaults. Implements [`PolicySource`], so the engine sees a change on its
/// next update.
#[derive(Debug)]
pub struct SettingsStore {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    kv: KvStore,
    policy: AlertPolicy,
}

impl SettingsStore {
    pub fn new(kv: KvStore) -> Self {
        let policy = read_policy(&kv);
        Self { inner: Mutex::new(Inner { kv, policy }) }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.inner.lock().unwrap().policy
    }

    pub fn set_radius(&self, radius: Radius) -> Result<()> {
        self.write(RADIUS_KEY, radius.meters(), |p| p.radius = radius)
    }

    pub fn set_duration(&self, duration: AlertDuration) -> Result<()> {
        self.write(DURATION_KEY, duration.seconds(), |p| p.duration = duration)
    }

    pub fn set_modality(&self, modality: AlertModality) -> Result<()> {
        self.write(MODALITY_KEY, modality, |p| p.modality = modality)
    }

    /// Re-reads the file if another process touched it since the last load.
    pub fn refresh_if_changed(&self) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.kv.changed_on_disk() {
            return Ok(false);
        }
        inner.kv.reload()?;
        let policy = read_policy(&inner.kv);
        if policy != inner.policy {
            debug!("settings: reloaded {:?}", policy);
        }
        inner.policy = policy;
        Ok(true)
    }

    fn write<T: serde::Serialize>(&self, key: &str, raw: T, apply: impl FnOnce(&mut AlertPolicy)) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        apply(&mut inner.policy);
        inner.kv.set(key, &raw).map_err(|e| {
            warn!("settings: failed to persist {}: {}", key, e);
            e
        })
    }
}

impl PolicySource for SettingsStore {
    fn policy(&self) -> AlertPolicy {
        SettingsStore::policy(self)
    }
}

fn read_policy(kv: &KvStore) -> AlertPolicy {
    let mut p = AlertPolicy::default();
    if let Some(r) = raw_u32(kv, RADIUS_KEY).and_then(|m| Radius::try_from(m).ok()) {
        p.radius = r;
    }
    if let Some(d) = raw_u32(kv, DURATION_KEY).and_then(|s| AlertDuration::try_from(s).ok()) {
        p.duration = d;
    }
    if let Some(m) = kv.get::<AlertModality>(MODALITY_KEY).and_then(|v| v.ok()) {
        p.modality = m;
    }
    p
}

// Older builds stored these as floating point numbers.
fn raw_u32(kv: &KvStore, key: &str) -> Option<u32> {
    let v = kv.get::<f64>(key)?.ok()?;
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64).then_some(v as u32)
}
