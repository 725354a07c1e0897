use crate::realtime::types::CLEAR_INTERVAL_FLOOR_MS;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct ClearTimerHandle {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
    interval: Duration,
}

/// Periodically asks the chart to drop accumulated data, independent of refreshes.
#[derive(Default)]
pub struct ClearTimer {
    running: Option<ClearTimerHandle>,
}

impl ClearTimer {
    /// A zero interval leaves the timer untouched. Intervals below 10ms are raised to 10ms.
    pub fn start<F>(&mut self, interval: Duration, mut on_tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return;
        }

        self.stop();
        let interval = interval.max(Duration::from_millis(CLEAR_INTERVAL_FLOOR_MS));
        let cancellation_token = CancellationToken::new();
        let task_token = cancellation_token.clone();

        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        trace!(interval_ms = interval.as_millis() as u64, "clear timer tick");
                        on_tick();
                    }
                }
            }
        });

        debug!(interval_ms = interval.as_millis() as u64, "clear timer started");
        self.running = Some(ClearTimerHandle {
            cancellation_token,
            join_handle,
            interval,
        });
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.running.take() {
            handle.cancellation_token.cancel();
            handle.join_handle.abort();
            debug!("clear timer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.running.as_ref().map(|handle| handle.interval)
    }
}

impl Drop for ClearTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_timer(interval: Duration) -> (ClearTimer, Arc<Mutex<Vec<Instant>>>, Instant) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&ticks);
        let started_at = Instant::now();
        let mut timer = ClearTimer::default();
        timer.start(interval, move || recorder.lock().push(Instant::now()));
        (timer, ticks, started_at)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_on_a_fixed_cadence() {
        let (mut timer, ticks, started_at) = recording_timer(Duration::from_millis(5_000));

        tokio::time::sleep(Duration::from_millis(15_500)).await;
        timer.stop();

        let offsets: Vec<u128> = ticks
            .lock()
            .iter()
            .map(|tick| tick.duration_since(started_at).as_millis())
            .collect();
        assert_eq!(offsets, vec![5_000, 10_000, 15_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn clamps_tiny_intervals_to_floor() {
        let (timer, ticks, _) = recording_timer(Duration::from_millis(1));
        assert_eq!(timer.interval(), Some(Duration::from_millis(10)));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(ticks.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_disabled() {
        let (timer, ticks, _) = recording_timer(Duration::ZERO);
        assert!(!timer.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(ticks.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences_ticks() {
        let (mut timer, ticks, _) = recording_timer(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(150)).await;

        timer.stop();
        timer.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(ticks.lock().len(), 1);
        assert!(!timer.is_running());

        let mut never_started = ClearTimer::default();
        never_started.stop();
    }
}
