use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Armed,
    Update,
    Arrived,
    Disarmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    Idle,
    Armed,
    Triggered,
}

/// Published by the proximity engine to whoever renders its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub state: StateTag,
    // Target (absent after disarm)
    pub target_lat: Option<f64>,
    pub target_lon: Option<f64>,
    pub target_name: Option<String>,
    // Latest fix
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub distance_m: Option<f64>,
    pub reached: bool,
}
