use std::time::Duration;
use tokio::time::Instant;

/// Round-trip timing for the fetch currently in flight.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    pending_start: Option<Instant>,
}

impl LatencyTracker {
    pub fn mark_start(&mut self) -> Instant {
        let started_at = Instant::now();
        self.pending_start = Some(started_at);
        started_at
    }

    pub fn pending_start(&self) -> Option<Instant> {
        self.pending_start
    }

    /// Elapsed milliseconds since `started_at`; clears the pending start it matches.
    pub fn measure(&mut self, started_at: Instant) -> u64 {
        if self.pending_start == Some(started_at) {
            self.pending_start = None;
        }
        duration_to_ms(Instant::now().saturating_duration_since(started_at))
    }

    pub fn reset(&mut self) {
        self.pending_start = None;
    }
}

pub fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
