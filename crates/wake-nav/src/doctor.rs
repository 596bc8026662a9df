use anyhow::Result;
use std::path::Path;

use crate::geo::Coordinate;

pub fn check_location_source(source: &str, nmea_device: Option<&str>, nmea_file: Option<&str>, baud: u32) -> Result<()> {
    match source {
        "nmea-serial" => {
            let dev = nmea_device.unwrap_or_default();
            anyhow::ensure!(!dev.is_empty(), "location.nmea_device missing");
            anyhow::ensure!(baud >= 4800, "location.baud too low ({})", baud);
        }
        "nmea-file" => {
            let f = nmea_file.unwrap_or_default();
            anyhow::ensure!(!f.is_empty(), "location.nmea_file missing");
            anyhow::ensure!(Path::new(f).is_file(), "location.nmea_file not found: {}", f);
        }
        "simulated" => {}
        other => anyhow::bail!("unknown location.source: {}", other),
    }
    Ok(())
}

pub fn check_simulation(speed_mps: f64, interval_ms: u64) -> Result<()> {
    anyhow::ensure!(speed_mps > 0.0 && speed_mps <= 100.0, "location.sim_speed_mps should be 0..100");
    anyhow::ensure!(interval_ms >= 100, "location.sim_interval_ms should be >= 100");
    Ok(())
}

/// Coordinates are accepted as-is by the engine; this only flags obvious typos.
pub fn check_coordinate(c: Coordinate) -> Result<()> {
    anyhow::ensure!(c.lat.is_finite() && c.lon.is_finite(), "coordinate not finite");
    anyhow::ensure!(c.lat.abs() <= 90.0 && c.lon.abs() <= 180.0, "coordinate out of range: {},{}", c.lat, c.lon);
    Ok(())
}
