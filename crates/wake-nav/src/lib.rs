//! Proximity alerting for WakePoint.
//!
//! A [`engine::ProximityEngine`] holds at most one armed [`engine::Target`],
//! evaluates every location sample against it and fires a one-shot alert once
//! the sample falls inside the configured radius.

pub mod alert;
pub mod background;
pub mod doctor;
pub mod engine;
pub mod error;
pub mod geo;
pub mod gnss;
pub mod policy;

pub use geo::Coordinate;
