use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::policy::AlertModality;

pub const WAKE_UP_TITLE: &str = "Time to wake up!";
pub const WAKE_UP_BODY: &str = "You have reached or are very close to the position you set.";

/// Fire-and-forget local notification sink.
pub trait Notifier: Send + Sync {
    fn post_local_notification(&self, title: &str, body: &str);
}

/// Produces one haptic/sound pulse per call.
pub trait AlertOutput: Send + Sync {
    fn pulse(&self, modality: AlertModality);
}

/// Pulses an [`AlertOutput`] once per second for a fixed number of ticks, then stops.
///
/// The first pulse lands one second after `start`. Dropping or cancelling the
/// handle stops any remaining pulses. Starting outside a tokio runtime logs a
/// warning and yields `None`.
pub struct RepeatingAlert {
    task: JoinHandle<()>,
    pulses: Arc<AtomicU32>,
    ticks: u32,
}

impl RepeatingAlert {
    pub fn start(output: Arc<dyn AlertOutput>, modality: AlertModality, ticks: u32) -> Option<Self> {
        Self::start_with_period(output, modality, ticks, Duration::from_secs(1))
    }

    pub fn start_with_period(
        output: Arc<dyn AlertOutput>,
        modality: AlertModality,
        ticks: u32,
        period: Duration,
    ) -> Option<Self> {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!("alert: no async runtime, {} pulse(s) of {} skipped", ticks, modality);
            return None;
        };
        let pulses = Arc::new(AtomicU32::new(0));
        let counter = pulses.clone();
        let task = rt.spawn(async move {
            let mut iv = tokio::time::interval_at(Instant::now() + period, period);
            for _ in 0..ticks {
                iv.tick().await;
                output.pulse(modality);
                counter.fetch_add(1, Ordering::Relaxed);
            }
            debug!("alert: {} {} pulse(s) done", ticks, modality);
        });
        Some(Self { task, pulses, ticks })
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn pulses(&self) -> u32 {
        self.pulses.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn cancel(&self) {
        if self.is_running() {
            debug!("alert: cancelled after {}/{} pulse(s)", self.pulses(), self.ticks);
        }
        self.task.abort();
    }
}

impl Drop for RepeatingAlert {
    fn drop(&mut self) {
        self.task.abort();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingOutput;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pulses_once_per_second_then_stops() {
        let out = Arc::new(CountingOutput::default());
        let alert = RepeatingAlert::start(out.clone(), AlertModality::Vibration, 5).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(out.total(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(out.vibrations.load(Ordering::Relaxed), 5);
        assert_eq!(alert.pulses(), 5);
        assert!(!alert.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_remaining_pulses() {
        let out = Arc::new(CountingOutput::default());
        let alert = RepeatingAlert::start(out.clone(), AlertModality::Sound, 15).unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(out.sounds.load(Ordering::Relaxed), 2);

        alert.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(out.sounds.load(Ordering::Relaxed), 2);
        assert!(!alert.is_running());
    }

    #[test]
    fn start_without_runtime_is_skipped() {
        let out = Arc::new(CountingOutput::default());
        assert!(RepeatingAlert::start(out.clone(), AlertModality::Vibration, 5).is_none());
        assert_eq!(out.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let out = Arc::new(CountingOutput::default());
        drop(RepeatingAlert::start(out.clone(), AlertModality::Vibration, 10));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(out.total(), 0);
    }
}
