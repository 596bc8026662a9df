use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Arrival radius choices offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Radius {
    Short,
    Medium,
    #[default]
    Long,
    VeryLong,
    Extreme,
}

impl Radius {
    pub const ALL: [Radius; 5] = [Radius::Short, Radius::Medium, Radius::Long, Radius::VeryLong, Radius::Extreme];

    pub const fn meters(self) -> u32 {
        match self {
            Radius::Short => 250,
            Radius::Medium => 500,
            Radius::Long => 750,
            Radius::VeryLong => 1000,
            Radius::Extreme => 1500,
        }
    }
}

impl TryFrom<u32> for Radius {
    type Error = PolicyValueError;

    fn try_from(m: u32) -> Result<Self, Self::Error> {
        Radius::ALL
            .into_iter()
            .find(|r| r.meters() == m)
            .ok_or(PolicyValueError::Radius(m))
    }
}

impl From<Radius> for u32 {
    fn from(r: Radius) -> u32 {
        r.meters()
    }
}

/// How long the alert keeps pulsing once it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AlertDuration {
    Short,
    Medium,
    #[default]
    Long,
}

impl AlertDuration {
    pub const ALL: [AlertDuration; 3] = [AlertDuration::Short, AlertDuration::Medium, AlertDuration::Long];

    pub const fn seconds(self) -> u32 {
        match self {
            AlertDuration::Short => 5,
            AlertDuration::Medium => 10,
            AlertDuration::Long => 15,
        }
    }
}

impl TryFrom<u32> for AlertDuration {
    type Error = PolicyValueError;

    fn try_from(s: u32) -> Result<Self, Self::Error> {
        AlertDuration::ALL
            .into_iter()
            .find(|d| d.seconds() == s)
            .ok_or(PolicyValueError::Duration(s))
    }
}

impl From<AlertDuration> for u32 {
    fn from(d: AlertDuration) -> u32 {
        d.seconds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertModality {
    #[default]
    Vibration,
    Sound,
}

impl std::str::FromStr for AlertModality {
    type Err = PolicyValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vibration" | "vibrate" => Ok(AlertModality::Vibration),
            "sound" => Ok(AlertModality::Sound),
            other => Err(PolicyValueError::Modality(other.to_string())),
        }
    }
}

impl std::fmt::Display for AlertModality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertModality::Vibration => f.write_str("vibration"),
            AlertModality::Sound => f.write_str("sound"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyValueError {
    #[error("radius must be one of 250, 500, 750, 1000, 1500 (got {0})")]
    Radius(u32),
    #[error("alert duration must be one of 5, 10, 15 seconds (got {0})")]
    Duration(u32),
    #[error("alert modality must be vibration or sound (got {0:?})")]
    Modality(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertPolicy {
    pub radius: Radius,
    pub duration: AlertDuration,
    pub modality: AlertModality,
}

impl AlertPolicy {
    pub fn radius_m(&self) -> f64 {
        self.radius.meters() as f64
    }
}

/// Where the engine reads its alert parameters from.
///
/// Called once per location update, so implementations should be cheap and
/// must reflect the latest user settings.
pub trait PolicySource: Send + Sync {
    fn policy(&self) -> AlertPolicy;
}

/// In-process policy holder; clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct SharedPolicy(Arc<RwLock<AlertPolicy>>);

impl SharedPolicy {
    pub fn new(policy: AlertPolicy) -> Self {
        Self(Arc::new(RwLock::new(policy)))
    }

    pub fn update(&self, f: impl FnOnce(&mut AlertPolicy)) {
        f(&mut self.0.write().unwrap());
    }
}

impl PolicySource for SharedPolicy {
    fn policy(&self) -> AlertPolicy {
        *self.0.read().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_round_trip() {
        for r in Radius::ALL {
            assert_eq!(Radius::try_from(r.meters()), Ok(r));
        }
        for d in AlertDuration::ALL {
            assert_eq!(AlertDuration::try_from(d.seconds()), Ok(d));
        }
    }

    #[test]
    fn unknown_raw_values_rejected() {
        assert_eq!(Radius::try_from(600), Err(PolicyValueError::Radius(600)));
        assert_eq!(AlertDuration::try_from(7), Err(PolicyValueError::Duration(7)));
        assert!("buzz".parse::<AlertModality>().is_err());
    }

    #[test]
    fn defaults_match_app() {
        let p = AlertPolicy::default();
        assert_eq!(p.radius.meters(), 750);
        assert_eq!(p.duration.seconds(), 15);
        assert_eq!(p.modality, AlertModality::Vibration);
    }

    #[test]
    fn shared_policy_sees_updates() {
        let shared = SharedPolicy::default();
        let reader = shared.clone();
        shared.update(|p| p.radius = Radius::Short);
        assert_eq!(reader.policy().radius, Radius::Short);
    }
}
