use crate::error::{NetworkError, NetworkErrorKind};
use crate::realtime::clear_timer::ClearTimer;
use crate::realtime::fetch::{FetchClient, Transport};
use crate::realtime::host::ChartHost;
use crate::realtime::latency::{duration_to_ms, LatencyTracker};
use crate::realtime::types::{
    FeedOutcome, FeedSource, FeedUpdate, RawPayload, RealtimeEvent, RefreshConfig, RefreshState,
    RefreshStatusSnapshot, RefreshSummary, UpdateErrorEvent,
};
use crate::state::SharedStatus;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Sleep};
use tracing::{debug, trace, warn};

const FETCH_WARN_THROTTLE_MS: u64 = 500;

/// Completion of a spawned fetch, tagged with the generation it was issued for.
#[derive(Debug)]
pub struct FetchCompletion {
    pub generation: u64,
    pub result: Result<RawPayload, NetworkError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub state: RefreshState,
    pub last_fetch_started_at: Option<Instant>,
    pub last_network_latency_ms: u64,
    pub last_draw_latency_ms: u64,
    pub continuity_token: Option<String>,
    pub error_count: u64,
    pub fetch_count: u64,
    pub generation: u64,
}

impl Default for RefreshSession {
    fn default() -> Self {
        Self {
            state: RefreshState::Idle,
            last_fetch_started_at: None,
            last_network_latency_ms: 0,
            last_draw_latency_ms: 0,
            continuity_token: None,
            error_count: 0,
            fetch_count: 0,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AwaitingDraw {
    network_latency_ms: u64,
    applied_at: Instant,
}

#[derive(Debug, Default)]
struct FetchWarnThrottle {
    last_kind: Option<NetworkErrorKind>,
    last_status: Option<u16>,
    last_emit: Option<Instant>,
}

impl FetchWarnThrottle {
    fn allow(&mut self, error: &NetworkError) -> bool {
        let now = Instant::now();
        if self.last_kind == Some(error.kind)
            && self.last_status == error.status
            && self
                .last_emit
                .map(|instant| {
                    now.duration_since(instant) < Duration::from_millis(FETCH_WARN_THROTTLE_MS)
                })
                .unwrap_or(false)
        {
            return false;
        }

        self.last_kind = Some(error.kind);
        self.last_status = error.status;
        self.last_emit = Some(now);
        true
    }
}

/// Start-to-start compensated delay before the next fetch.
///
/// Once the measured latency reaches the nominal interval the delay bottoms
/// out at `min_interval` instead of going to zero.
pub fn next_refresh_delay(
    nominal_interval: Duration,
    min_interval: Duration,
    total_latency: Duration,
) -> Duration {
    nominal_interval
        .saturating_sub(total_latency)
        .max(min_interval)
}

/// Adaptive polling loop for one chart.
///
/// Owns the pending refresh timer, the in-flight request and the clear timer.
/// All methods run on the session's driver task; fetches run in spawned tasks
/// and come back through the completion channel given at construction.
pub struct RefreshScheduler<T, H> {
    session: RefreshSession,
    config: Option<RefreshConfig>,
    fetch_client: FetchClient<T>,
    clear_timer: ClearTimer,
    latency: LatencyTracker,
    pending_timer: Option<Pin<Box<Sleep>>>,
    awaiting_draw: Option<AwaitingDraw>,
    host: Arc<H>,
    events: broadcast::Sender<RealtimeEvent>,
    status_store: SharedStatus,
    completions: mpsc::UnboundedSender<FetchCompletion>,
    warn_throttle: FetchWarnThrottle,
}

impl<T: Transport, H: ChartHost> RefreshScheduler<T, H> {
    pub fn new(
        host: Arc<H>,
        transport: Arc<T>,
        events: broadcast::Sender<RealtimeEvent>,
        status_store: SharedStatus,
        completions: mpsc::UnboundedSender<FetchCompletion>,
    ) -> Self {
        Self {
            session: RefreshSession::default(),
            config: None,
            fetch_client: FetchClient::new(transport),
            clear_timer: ClearTimer::default(),
            latency: LatencyTracker::default(),
            pending_timer: None,
            awaiting_draw: None,
            host,
            events,
            status_store,
            completions,
            warn_throttle: FetchWarnThrottle::default(),
        }
    }

    pub fn session(&self) -> &RefreshSession {
        &self.session
    }

    pub fn state(&self) -> RefreshState {
        self.session.state
    }

    pub fn config(&self) -> Option<&RefreshConfig> {
        self.config.as_ref()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.pending_timer.is_some()
    }

    pub fn has_active_request(&self) -> bool {
        self.fetch_client.has_active_request()
    }

    pub fn is_clear_timer_running(&self) -> bool {
        self.clear_timer.is_running()
    }

    pub fn is_awaiting_draw(&self) -> bool {
        self.awaiting_draw.is_some()
    }

    /// Time left until the pending refresh timer fires.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.pending_timer
            .as_ref()
            .map(|sleep| sleep.deadline().saturating_duration_since(Instant::now()))
    }

    /// Resolves when the pending refresh timer elapses; never resolves without one.
    pub async fn timer_fired(&mut self) {
        match self.pending_timer.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Begins refreshing with `config`. Returns whether a first fetch was scheduled.
    ///
    /// A paused session adopts the config but stays paused until resumed.
    pub fn start(&mut self, mut config: RefreshConfig) -> bool {
        if matches!(
            self.session.state,
            RefreshState::InFlight | RefreshState::Disposed
        ) {
            debug!(state = ?self.session.state, "ignoring realtime start");
            return false;
        }
        let paused = self.session.state == RefreshState::Paused;

        if config.nominal_interval.is_zero() {
            if !paused {
                self.cancel_timer();
                self.session.state = RefreshState::Idle;
                self.publish_status(Some("realtime disabled: refresh interval is zero"));
            }
            return false;
        }

        config.nominal_interval = config.effective_interval();
        self.fetch_client
            .set_request_timeout(config.request_timeout);

        self.clear_timer.stop();
        if !config.clear_interval.is_zero() {
            let host = Arc::clone(&self.host);
            self.clear_timer
                .start(config.clear_interval, move || host.clear_chart());
        }

        debug!(
            url = %config.endpoint_url,
            interval_ms = duration_to_ms(config.nominal_interval),
            sync_mode = config.sync_mode,
            "realtime session started"
        );
        self.config = Some(config);
        if paused {
            self.publish_status(Some("configured while paused"));
            return false;
        }
        self.schedule(Duration::ZERO, "first refresh scheduled");
        true
    }

    /// Replaces any pending timer with one firing after `delay`.
    fn schedule(&mut self, delay: Duration, reason: &str) {
        self.cancel_timer();
        self.pending_timer = Some(Box::pin(tokio::time::sleep(delay)));
        self.session.state = RefreshState::Scheduled;
        trace!(delay_ms = duration_to_ms(delay), "realtime refresh scheduled");
        self.publish_status(Some(reason));
    }

    fn cancel_timer(&mut self) -> bool {
        self.pending_timer.take().is_some()
    }

    pub fn on_timer_fire(&mut self) {
        self.pending_timer = None;
        if self.session.state != RefreshState::Scheduled {
            return;
        }
        let Some(config) = self.config.as_ref() else {
            self.session.state = RefreshState::Idle;
            return;
        };

        self.awaiting_draw = None;
        self.session.generation = self.session.generation.wrapping_add(1);
        let generation = self.session.generation;
        let started_at = self.latency.mark_start();
        self.session.last_fetch_started_at = Some(started_at);

        let request = self.fetch_client.fetch(
            &config.endpoint_url,
            self.session.continuity_token.as_deref(),
            generation,
        );
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = request.await;
            let _ = completions.send(FetchCompletion { generation, result });
        });

        self.session.state = RefreshState::InFlight;
        self.publish_status(Some("fetch in flight"));
    }

    /// Routes a completion to the success or error path, dropping stale ones.
    pub fn on_fetch_complete(&mut self, completion: FetchCompletion) {
        if self.session.state != RefreshState::InFlight
            || completion.generation != self.session.generation
        {
            trace!(
                generation = completion.generation,
                current = self.session.generation,
                state = ?self.session.state,
                "discarding stale realtime completion"
            );
            return;
        }

        self.fetch_client.finish(completion.generation);
        match completion.result {
            Ok(payload) => self.on_fetch_success(payload),
            Err(error) => self.on_fetch_error(error),
        }
    }

    fn measure_network_latency(&mut self) -> u64 {
        let latency_ms = match self.session.last_fetch_started_at {
            Some(started_at) => self.latency.measure(started_at),
            None => 0,
        };
        self.session.last_network_latency_ms = latency_ms;
        latency_ms
    }

    fn on_fetch_success(&mut self, payload: RawPayload) {
        let Some(config) = self.config.clone() else {
            return;
        };
        let network_latency_ms = self.measure_network_latency();

        let outcome = self.host.apply_feed(FeedUpdate {
            payload: &payload,
            source: FeedSource::Fetch,
            url: Some(&config.endpoint_url),
            transition_budget: config.transition_budget(),
        });
        self.session.fetch_count = self.session.fetch_count.saturating_add(1);
        if let Some(token) = outcome.continuity_token {
            self.session.continuity_token = Some(token);
        }

        if !config.sync_mode {
            self.finish_cycle(network_latency_ms, 0);
        } else if let Some(draw_latency) = outcome.draw_latency {
            self.finish_cycle(network_latency_ms, duration_to_ms(draw_latency));
        } else {
            // Fallback keeps the loop alive if the renderer never reports back.
            self.awaiting_draw = Some(AwaitingDraw {
                network_latency_ms,
                applied_at: Instant::now(),
            });
            self.schedule(config.nominal_interval, "waiting for draw completion");
        }
    }

    fn finish_cycle(&mut self, network_latency_ms: u64, draw_latency_ms: u64) {
        let Some(config) = self.config.as_ref() else {
            return;
        };
        let url = config.endpoint_url.clone();
        let total_latency =
            Duration::from_millis(network_latency_ms.saturating_add(draw_latency_ms));
        let next_delay =
            next_refresh_delay(config.nominal_interval, config.min_interval, total_latency);

        self.awaiting_draw = None;
        self.session.last_draw_latency_ms = draw_latency_ms;
        self.schedule(next_delay, "refresh applied");

        self.host.refresh_complete(&RefreshSummary {
            url,
            network_latency_ms,
            draw_latency_ms,
            next_delay_ms: duration_to_ms(next_delay),
        });
    }

    /// Folds a renderer draw-complete signal into the cycle waiting for it.
    ///
    /// Without an explicit measurement the time since the data was handed over
    /// is used. Returns whether a cycle was waiting.
    pub fn draw_complete(&mut self, draw_latency: Option<Duration>) -> bool {
        if self.session.state != RefreshState::Scheduled {
            return false;
        }
        let Some(awaiting) = self.awaiting_draw.take() else {
            return false;
        };

        let draw_latency_ms = draw_latency
            .map(duration_to_ms)
            .unwrap_or_else(|| duration_to_ms(awaiting.applied_at.elapsed()));
        self.finish_cycle(awaiting.network_latency_ms, draw_latency_ms);
        true
    }

    fn on_fetch_error(&mut self, error: NetworkError) {
        let network_latency_ms = self.measure_network_latency();
        self.session.error_count = self.session.error_count.saturating_add(1);

        if self.warn_throttle.allow(&error) {
            warn!(
                url = %error.url,
                status = ?error.status,
                error_count = self.session.error_count,
                "realtime fetch failed: {error}"
            );
        }
        self.emit(RealtimeEvent::UpdateError(
            UpdateErrorEvent::from_network_error(&error, network_latency_ms),
        ));

        let Some(retry_delay) = self.config.as_ref().map(|config| config.nominal_interval) else {
            self.session.state = RefreshState::Idle;
            return;
        };
        self.schedule(retry_delay, "retrying after fetch error");
    }

    /// Any active state to `Paused`. Keeps the continuity token and measurements.
    pub fn pause(&mut self) -> bool {
        if !matches!(
            self.session.state,
            RefreshState::Idle | RefreshState::Scheduled | RefreshState::InFlight
        ) {
            return false;
        }

        self.cancel_timer();
        self.fetch_client.abort();
        self.latency.reset();
        self.awaiting_draw = None;
        self.session.state = RefreshState::Paused;
        self.publish_status(Some("updates paused"));
        true
    }

    /// `Paused` to an immediate refetch, provided an endpoint was configured.
    pub fn resume(&mut self) -> bool {
        if self.session.state != RefreshState::Paused {
            return false;
        }
        if self.config.is_none() {
            self.session.state = RefreshState::Idle;
            self.publish_status(Some("resumed before any endpoint was configured"));
            return false;
        }

        self.schedule(Duration::ZERO, "updates resumed");
        true
    }

    /// Drops the pending timer and in-flight request ahead of a structural rebuild.
    ///
    /// The session stays configured and falls back to `Idle` until
    /// [`RefreshScheduler::restart_after_render`] is called.
    pub fn cancel_pending(&mut self) -> bool {
        if !matches!(
            self.session.state,
            RefreshState::Scheduled | RefreshState::InFlight
        ) {
            return false;
        }

        self.cancel_timer();
        self.fetch_client.abort();
        self.latency.reset();
        self.awaiting_draw = None;
        self.session.state = RefreshState::Idle;
        self.publish_status(Some("render in progress"));
        true
    }

    /// Resumes scheduling after a render cancelled it. Draw time is only subtracted in sync mode.
    pub fn restart_after_render(&mut self, draw_latency: Option<Duration>) -> bool {
        if self.session.state != RefreshState::Idle {
            return false;
        }
        let Some(config) = self.config.as_ref() else {
            return false;
        };

        let draw_latency = if config.sync_mode {
            draw_latency.unwrap_or_default()
        } else {
            Duration::ZERO
        };
        let delay = next_refresh_delay(config.nominal_interval, config.min_interval, draw_latency);
        self.session.last_draw_latency_ms = duration_to_ms(draw_latency);
        self.schedule(delay, "rescheduled after render");
        true
    }

    /// Terminal. Cancels the timer, aborts the request and stops the clear timer.
    pub fn dispose(&mut self) {
        if self.session.state == RefreshState::Disposed {
            return;
        }

        self.cancel_timer();
        self.fetch_client.abort();
        self.clear_timer.stop();
        self.latency.reset();
        self.awaiting_draw = None;
        self.session.state = RefreshState::Disposed;
        debug!(
            fetch_count = self.session.fetch_count,
            error_count = self.session.error_count,
            "realtime session disposed"
        );
        self.publish_status(Some("chart disposed"));
    }

    /// Hands a pushed payload to the data feed through the same path as a fetch.
    pub fn push_payload(&mut self, payload: &RawPayload, source: FeedSource) -> Option<FeedOutcome> {
        if self.session.state == RefreshState::Disposed {
            return None;
        }

        let transition_budget = self
            .config
            .as_ref()
            .map(|config| config.transition_budget())
            .unwrap_or_default();
        let url = self.config.as_ref().map(|config| config.endpoint_url.as_str());
        let outcome = self.host.apply_feed(FeedUpdate {
            payload,
            source,
            url,
            transition_budget,
        });
        Some(outcome)
    }

    pub fn clear_chart(&self) -> bool {
        if self.session.state == RefreshState::Disposed {
            return false;
        }
        self.host.clear_chart();
        true
    }

    pub fn emit(&self, event: RealtimeEvent) {
        if self.events.send(event).is_err() {
            trace!("no realtime event subscribers");
        }
    }

    fn publish_status(&self, reason: Option<&str>) {
        let snapshot = RefreshStatusSnapshot {
            state: self.session.state,
            endpoint_url: self
                .config
                .as_ref()
                .map(|config| config.endpoint_url.clone()),
            last_network_latency_ms: self.session.last_network_latency_ms,
            last_draw_latency_ms: self.session.last_draw_latency_ms,
            continuity_token: self.session.continuity_token.clone(),
            error_count: self.session.error_count,
            fetch_count: self.session.fetch_count,
            reason: reason.map(str::to_string),
        };
        *self.status_store.write() = snapshot;
    }
}
