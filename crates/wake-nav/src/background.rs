use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tracing::info;

/// Platform switch that keeps location updates flowing while the app is not
/// in the foreground. Requests must be idempotent.
pub trait BackgroundActivity: Send + Sync {
    fn set_keep_alive(&self, on: bool);
}

/// Shared boolean keep-alive switch. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct KeepAliveSwitch {
    on: Arc<AtomicBool>,
    flips: Arc<AtomicU32>,
}

impl KeepAliveSwitch {
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    /// Number of effective state changes so far.
    pub fn flips(&self) -> u32 {
        self.flips.load(Ordering::SeqCst)
    }
}

impl BackgroundActivity for KeepAliveSwitch {
    fn set_keep_alive(&self, on: bool) {
        if self.on.swap(on, Ordering::SeqCst) == on {
            return;
        }
        self.flips.fetch_add(1, Ordering::SeqCst);
        if on {
            info!("background: keep-alive requested, location updates continue in background");
        } else {
            info!("background: keep-alive released, foreground-only updates");
        }
    }
}
