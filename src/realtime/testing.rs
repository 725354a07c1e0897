//! Scripted collaborators shared by the realtime unit tests.

use crate::error::NetworkError;
use crate::realtime::fetch::Transport;
use crate::realtime::host::ChartHost;
use crate::realtime::types::{
    FeedOutcome, FeedSource, FeedUpdate, RawPayload, RealtimeChartArgs, RefreshSummary,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub struct ScriptedTransport {
    latency: Mutex<Duration>,
    failures: Mutex<VecDeque<u16>>,
    requests: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedTransport {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency: Mutex::new(latency),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn fail_next(&self, status: u16) {
        self.failures.lock().push_back(status);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn request_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(at, _)| *at).collect()
    }
}

impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<RawPayload, NetworkError> {
        let latency = *self.latency.lock();
        let sequence = {
            let mut requests = self.requests.lock();
            requests.push((Instant::now(), url.to_string()));
            requests.len()
        };
        let failure = self.failures.lock().pop_front();

        tokio::time::sleep(latency).await;
        match failure {
            Some(status) => Err(NetworkError::status(url, status)),
            None => Ok(RawPayload::from(format!("&value={sequence}"))),
        }
    }
}

#[derive(Default)]
pub struct RecordingHost {
    args: Mutex<RealtimeChartArgs>,
    draw_latency: Mutex<Option<Duration>>,
    continuity_token: Mutex<Option<String>>,
    applied: Mutex<Vec<(FeedSource, String)>>,
    summaries: Mutex<Vec<RefreshSummary>>,
    clears: AtomicUsize,
}

impl RecordingHost {
    pub fn with_args(args: RealtimeChartArgs) -> Self {
        let host = Self::default();
        *host.args.lock() = args;
        host
    }

    pub fn set_draw_latency(&self, draw_latency: Option<Duration>) {
        *self.draw_latency.lock() = draw_latency;
    }

    pub fn set_continuity_token(&self, token: Option<String>) {
        *self.continuity_token.lock() = token;
    }

    pub fn applied_sources(&self) -> Vec<FeedSource> {
        self.applied.lock().iter().map(|(source, _)| *source).collect()
    }

    pub fn applied_payloads(&self) -> Vec<String> {
        self.applied
            .lock()
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn summaries(&self) -> Vec<RefreshSummary> {
        self.summaries.lock().clone()
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl ChartHost for RecordingHost {
    fn realtime_args(&self) -> RealtimeChartArgs {
        self.args.lock().clone()
    }

    fn apply_feed(&self, update: FeedUpdate<'_>) -> FeedOutcome {
        self.applied
            .lock()
            .push((update.source, update.payload.to_text()));
        FeedOutcome {
            draw_latency: *self.draw_latency.lock(),
            continuity_token: self.continuity_token.lock().clone(),
            update_object: Some(format!("{{\"source\":\"{}\"}}", update.source.as_str())),
        }
    }

    fn clear_chart(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn refresh_complete(&self, summary: &RefreshSummary) {
        self.summaries.lock().push(summary.clone());
    }
}
