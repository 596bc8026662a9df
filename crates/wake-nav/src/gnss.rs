use std::time::Duration;

use anyhow::Result;
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::error::LocationError;
use crate::geo::{destination_point, distance_m, initial_bearing_deg, Coordinate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixQuality {
    pub sats: u8,
    pub hdop: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub coord: Coordinate,
    pub ts: OffsetDateTime,
    pub quality: Option<FixQuality>,
}

impl LocationSample {
    pub fn now(coord: Coordinate) -> Self {
        Self { coord, ts: OffsetDateTime::now_utc(), quality: None }
    }
}

/// Whether the provider is allowed to deliver fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Denied,
    Unavailable,
}

impl Authorization {
    pub fn from_error(err: &LocationError) -> Self {
        match err {
            LocationError::PermissionDenied(_) => Authorization::Denied,
            _ => Authorization::Unavailable,
        }
    }
}

/// Straight-line walk toward a point, used when no receiver is attached.
#[derive(Debug, Clone)]
pub struct SimulatedTrack {
    pos: Coordinate,
    goal: Coordinate,
    step_m: f64,
    interval: Duration,
    started: bool,
    done: bool,
}

impl SimulatedTrack {
    pub fn new(start: Coordinate, goal: Coordinate, speed_mps: f64, interval: Duration) -> Self {
        let step_m = (speed_mps * interval.as_secs_f64()).max(1.0);
        Self { pos: start, goal, step_m, interval, started: false, done: false }
    }

    fn next(&mut self) -> Option<Coordinate> {
        if self.done {
            return None;
        }
        let here = self.pos;
        if here == self.goal {
            self.done = true;
            return Some(here);
        }
        self.pos = if distance_m(here, self.goal) <= self.step_m {
            self.goal
        } else {
            destination_point(here, initial_bearing_deg(here, self.goal), self.step_m)
        };
        Some(here)
    }
}

pub enum GnssSource {
    Serial(NmeaReader<SerialStream>),
    File(NmeaReader<File>),
    Simulated(SimulatedTrack),
}

impl GnssSource {
    pub fn serial(dev: &str, baud: u32) -> Result<Self, LocationError> {
        let port = tokio_serial::new(dev, baud)
            .open_native_async()
            .map_err(|e| LocationError::from_open(&format!("serial {}", dev), e.into()))?;
        Ok(Self::Serial(NmeaReader::new(port)))
    }

    pub fn file(path: &str) -> Result<Self, LocationError> {
        let f = std::fs::File::open(path)
            .map_err(|e| LocationError::from_open(&format!("nmea file {}", path), e))?;
        Ok(Self::File(NmeaReader::new(File::from_std(f))))
    }

    pub fn simulated(track: SimulatedTrack) -> Self {
        Self::Simulated(track)
    }

    /// Next position fix, or `None` once the stream is exhausted.
    pub async fn next_sample(&mut self) -> Result<Option<LocationSample>> {
        match self {
            GnssSource::Serial(r) => r.next_sample().await,
            GnssSource::File(r) => r.next_sample().await,
            GnssSource::Simulated(t) => {
                let Some(coord) = t.next() else { return Ok(None) };
                // first sample is immediate, later ones are paced
                if t.started {
                    tokio::time::sleep(t.interval).await;
                }
                t.started = true;
                Ok(Some(LocationSample::now(coord)))
            }
        }
    }
}

/// Line-oriented NMEA 0183 reader.
///
/// RMC sentences carry position; the most recent GGA supplies satellite count
/// and HDOP for the next RMC.
pub struct NmeaReader<R> {
    inner: BufReader<R>,
    parser: NmeaParser,
}

impl<R: tokio::io::AsyncRead + Unpin> NmeaReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: BufReader::new(inner), parser: NmeaParser::default() }
    }

    /// Lines that are not valid UTF-8 (serial noise, baud mismatch) are skipped.
    pub async fn next_sample(&mut self) -> Result<Option<LocationSample>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = self.inner.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                debug!("nmea: skipped {} byte non-utf8 line", n);
                continue;
            };
            if let Some(sample) = self.parser.feed(line.trim()) {
                return Ok(Some(sample));
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct NmeaParser {
    last_gga: Option<FixQuality>,
}

impl NmeaParser {
    pub fn feed(&mut self, s: &str) -> Option<LocationSample> {
        if s.starts_with("$GNGGA") || s.starts_with("$GPGGA") {
            let parts: Vec<&str> = s.split(',').collect();
            if parts.len() > 8 {
                let sats: u8 = parts[7].parse().unwrap_or(0);
                let hdop: f32 = parts[8].parse().unwrap_or(99.9);
                self.last_gga = Some(FixQuality { sats, hdop });
            }
            return None;
        }

        if s.starts_with("$GNRMC") || s.starts_with("$GPRMC") {
            let parts: Vec<&str> = s.split(',').collect();
            if parts.len() > 6 {
                // parts[2]=A/V status, parts[3..=6]=lat,N/S,lon,E/W
                if parts[2] != "A" {
                    debug!("nmea: rmc without valid fix ignored");
                    return None;
                }
                let lat = parse_deg_min(parts[3], parts[4])?;
                let lon = parse_deg_min(parts[5], parts[6])?;
                return Some(LocationSample {
                    coord: Coordinate::new(lat, lon),
                    ts: OffsetDateTime::now_utc(),
                    quality: self.last_gga,
                });
            }
        }

        None
    }
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() || !v.is_ascii() {
        return None;
    }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.').unwrap_or(v.len());
    if dot < 2 {
        return None;
    }
    let deg_len = dot - 2;
    let deg: f64 = v[..deg_len].parse().ok()?;
    let min: f64 = v[deg_len..].parse().ok()?;
    let mut out = deg + (min / 60.0);
    if hemi == "S" || hemi == "W" {
        out = -out;
    }
    Some(out)
}
