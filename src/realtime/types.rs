use crate::error::{ConfigError, NetworkError, RealtimeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_REFRESH_INTERVAL_SECS: f64 = 2.0;
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 10;
pub const DEFAULT_SYNC_MODE: bool = false;
pub const CLEAR_INTERVAL_FLOOR_MS: u64 = 10;
pub const MAX_MIN_INTERVAL_MS: u64 = 60_000;
pub const MIN_INTERVAL_ENV: &str = "CHART_REALTIME_MIN_INTERVAL_MS";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Scheduled,
    InFlight,
    Paused,
    Disposed,
}

impl RefreshState {
    /// Whether the session is still driving refreshes (or about to).
    pub fn is_update_active(self) -> bool {
        !matches!(self, Self::Paused | Self::Disposed)
    }
}

/// Realtime attributes as they appear in a chart's JSON configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeChartArgs {
    pub realtime_enabled: Option<bool>,
    #[serde(rename = "dataStreamURL", alias = "dataStreamUrl")]
    pub data_stream_url: Option<String>,
    pub refresh_interval: Option<f64>,
    pub update_interval: Option<f64>,
    pub clear_interval: Option<f64>,
    pub sync_mode: Option<bool>,
    pub min_interval_ms: Option<u64>,
    pub max_transition_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    pub endpoint_url: String,
    pub nominal_interval: Duration,
    pub clear_interval: Duration,
    pub sync_mode: bool,
    pub min_interval: Duration,
    pub max_transition: Duration,
    pub request_timeout: Option<Duration>,
}

impl RefreshConfig {
    pub fn new(endpoint_url: impl Into<String>, nominal_interval: Duration) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            nominal_interval,
            clear_interval: Duration::ZERO,
            sync_mode: DEFAULT_SYNC_MODE,
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            max_transition: nominal_interval,
            request_timeout: None,
        }
    }

    /// Nominal interval raised to the configured floor.
    pub fn effective_interval(&self) -> Duration {
        self.nominal_interval.max(self.min_interval)
    }

    /// Longest transition animation the renderer may run between two refreshes.
    pub fn transition_budget(&self) -> Duration {
        self.max_transition.min(self.effective_interval())
    }
}

impl RealtimeChartArgs {
    pub fn from_json_slice(payload: &mut [u8]) -> Result<Self, RealtimeError> {
        let args: RealtimeChartArgs = simd_json::serde::from_slice(payload)?;
        Ok(args)
    }

    pub fn normalize(self) -> Result<RefreshConfig, ConfigError> {
        if !self.realtime_enabled.unwrap_or(false) {
            return Err(ConfigError::Disabled);
        }

        let endpoint_url = self
            .data_stream_url
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        if reqwest::Url::parse(&endpoint_url).is_err() {
            return Err(ConfigError::InvalidUrl(endpoint_url));
        }

        let refresh_secs = self
            .refresh_interval
            .or(self.update_interval)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);
        let nominal_interval = seconds_to_duration(refresh_secs, "refreshInterval")?;
        if nominal_interval.is_zero() {
            return Err(ConfigError::NonPositiveInterval);
        }

        let clear_interval = match self.clear_interval {
            Some(secs) => seconds_to_duration(secs, "clearInterval")?,
            None => Duration::ZERO,
        };

        let min_interval_ms = self
            .min_interval_ms
            .or_else(resolve_min_interval_override)
            .unwrap_or(DEFAULT_MIN_INTERVAL_MS)
            .min(MAX_MIN_INTERVAL_MS);
        let min_interval = Duration::from_millis(min_interval_ms);

        let max_transition = self
            .max_transition_ms
            .map(Duration::from_millis)
            .unwrap_or(nominal_interval)
            .min(nominal_interval.max(min_interval));

        Ok(RefreshConfig {
            endpoint_url,
            nominal_interval,
            clear_interval,
            sync_mode: self.sync_mode.unwrap_or(DEFAULT_SYNC_MODE),
            min_interval,
            max_transition,
            request_timeout: self
                .request_timeout_ms
                .filter(|value| *value > 0)
                .map(Duration::from_millis),
        })
    }
}

fn resolve_min_interval_override() -> Option<u64> {
    std::env::var(MIN_INTERVAL_ENV)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Negative values collapse to zero, which callers treat as "disabled".
fn seconds_to_duration(secs: f64, field: &'static str) -> Result<Duration, ConfigError> {
    if !secs.is_finite() {
        return Err(ConfigError::NotFinite { field });
    }
    let millis = (secs * 1_000.0).round().max(0.0);
    Ok(Duration::from_millis(millis.min(u64::MAX as f64) as u64))
}

/// Response body handed verbatim to the chart's data feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPayload(Vec<u8>);

impl RawPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RawPayload {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&str> for RawPayload {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FeedSource {
    Fetch,
    SetData,
    FeedData,
}

impl FeedSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::SetData => "setData",
            Self::FeedData => "feedData",
        }
    }
}

/// One unit of data handed to the chart's data feed.
#[derive(Debug, Clone, Copy)]
pub struct FeedUpdate<'a> {
    pub payload: &'a RawPayload,
    pub source: FeedSource,
    pub url: Option<&'a str>,
    pub transition_budget: Duration,
}

/// What the data feed reports back after consuming an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Time spent re-rendering, when the renderer measured it synchronously.
    pub draw_latency: Option<Duration>,
    pub continuity_token: Option<String>,
    pub update_object: Option<String>,
}

/// Summary passed to the host once a pulled refresh has been applied.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub url: String,
    pub network_latency_ms: u64,
    pub draw_latency_ms: u64,
    pub next_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStatusSnapshot {
    pub state: RefreshState,
    pub endpoint_url: Option<String>,
    pub last_network_latency_ms: u64,
    pub last_draw_latency_ms: u64,
    pub continuity_token: Option<String>,
    pub error_count: u64,
    pub fetch_count: u64,
    pub reason: Option<String>,
}

impl RefreshStatusSnapshot {
    pub fn idle(reason: Option<String>) -> Self {
        Self {
            state: RefreshState::Idle,
            endpoint_url: None,
            last_network_latency_ms: 0,
            last_draw_latency_ms: 0,
            continuity_token: None,
            error_count: 0,
            fetch_count: 0,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateErrorEvent {
    pub source: String,
    pub url: String,
    pub transport_error: Option<String>,
    pub http_status: Option<u16>,
    pub network_latency: u64,
}

impl UpdateErrorEvent {
    pub fn from_network_error(error: &NetworkError, network_latency_ms: u64) -> Self {
        Self {
            source: FeedSource::Fetch.as_str().to_string(),
            url: error.url.clone(),
            transport_error: Some(
                error
                    .transport_message()
                    .unwrap_or_else(|| error.kind.as_str().to_string()),
            ),
            http_status: error.status,
            network_latency: network_latency_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStoppedEvent {
    pub source: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompleteEvent {
    pub data: String,
    pub update_object: Option<String>,
    pub prev_data: Option<String>,
    pub source: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RealtimeEvent {
    UpdateError(UpdateErrorEvent),
    UpdateStopped(UpdateStoppedEvent),
    UpdateComplete(UpdateCompleteEvent),
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateError(_) => super::REALTIME_UPDATE_ERROR_EVENT,
            Self::UpdateStopped(_) => super::REALTIME_UPDATE_STOPPED_EVENT,
            Self::UpdateComplete(_) => super::REALTIME_UPDATE_COMPLETE_EVENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_args(url: &str) -> RealtimeChartArgs {
        RealtimeChartArgs {
            realtime_enabled: Some(true),
            data_stream_url: Some(url.to_string()),
            refresh_interval: Some(2.0),
            min_interval_ms: Some(DEFAULT_MIN_INTERVAL_MS),
            ..Default::default()
        }
    }

    #[test]
    fn parses_chart_json_attributes() {
        let mut payload = br#"{"realtimeEnabled":true,"dataStreamURL":"http://x/data","refreshInterval":2,"clearInterval":0}"#
            .to_vec();
        let args = RealtimeChartArgs::from_json_slice(&mut payload)
            .expect("chart attributes should parse");

        assert_eq!(args.realtime_enabled, Some(true));
        assert_eq!(args.data_stream_url.as_deref(), Some("http://x/data"));
        assert_eq!(args.refresh_interval, Some(2.0));
        assert_eq!(args.clear_interval, Some(0.0));
    }

    #[test]
    fn normalizes_seconds_to_durations() {
        let config = RealtimeChartArgs {
            clear_interval: Some(5.0),
            ..enabled_args("http://x/data")
        }
        .normalize()
        .expect("enabled args should normalize");

        assert_eq!(config.endpoint_url, "http://x/data");
        assert_eq!(config.nominal_interval, Duration::from_millis(2_000));
        assert_eq!(config.clear_interval, Duration::from_millis(5_000));
        assert_eq!(config.min_interval, Duration::from_millis(10));
        assert!(!config.sync_mode);
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn disabled_or_missing_flag_is_inert() {
        let mut args = enabled_args("http://x/data");
        args.realtime_enabled = None;
        assert_eq!(args.clone().normalize(), Err(ConfigError::Disabled));

        args.realtime_enabled = Some(false);
        assert_eq!(args.normalize(), Err(ConfigError::Disabled));
    }

    #[test]
    fn missing_or_blank_url_is_inert() {
        let mut args = enabled_args("   ");
        assert_eq!(args.clone().normalize(), Err(ConfigError::MissingUrl));

        args.data_stream_url = None;
        assert_eq!(args.normalize(), Err(ConfigError::MissingUrl));
    }

    #[test]
    fn relative_url_is_rejected() {
        let result = enabled_args("/data.php").normalize();
        assert_eq!(result, Err(ConfigError::InvalidUrl("/data.php".to_string())));
    }

    #[test]
    fn non_positive_refresh_interval_is_rejected() {
        let mut args = enabled_args("http://x/data");
        args.refresh_interval = Some(0.0);
        assert_eq!(
            args.clone().normalize(),
            Err(ConfigError::NonPositiveInterval)
        );

        args.refresh_interval = Some(-3.0);
        assert_eq!(args.normalize(), Err(ConfigError::NonPositiveInterval));
    }

    #[test]
    fn update_interval_is_used_when_refresh_interval_is_absent() {
        let mut args = enabled_args("http://x/data");
        args.refresh_interval = None;
        args.update_interval = Some(0.5);
        let config = args.normalize().expect("update interval should be accepted");

        assert_eq!(config.nominal_interval, Duration::from_millis(500));
    }

    #[test]
    fn non_finite_interval_is_rejected() {
        let mut args = enabled_args("http://x/data");
        args.clear_interval = Some(f64::NAN);
        assert_eq!(
            args.normalize(),
            Err(ConfigError::NotFinite {
                field: "clearInterval"
            })
        );
    }

    #[test]
    fn transition_budget_never_exceeds_refresh_interval() {
        let mut args = enabled_args("http://x/data");
        args.max_transition_ms = Some(10_000);
        let config = args.normalize().expect("args should normalize");
        assert_eq!(config.max_transition, Duration::from_millis(2_000));
        assert_eq!(config.transition_budget(), Duration::from_millis(2_000));

        let mut short = RefreshConfig::new("http://x/data", Duration::from_millis(1_000));
        short.max_transition = Duration::from_millis(250);
        assert_eq!(short.transition_budget(), Duration::from_millis(250));
    }

    #[test]
    fn effective_interval_respects_floor() {
        let mut config = RefreshConfig::new("http://x/data", Duration::from_millis(3));
        assert_eq!(config.effective_interval(), Duration::from_millis(10));

        config.nominal_interval = Duration::from_millis(1_000);
        assert_eq!(config.effective_interval(), Duration::from_millis(1_000));
    }

    #[test]
    fn events_report_their_wire_names() {
        let stopped = RealtimeEvent::UpdateStopped(UpdateStoppedEvent {
            source: "user".to_string(),
        });
        assert_eq!(stopped.name(), "realimeUpdateStopped");

        let error = NetworkError::status("http://x/data?num=1", 503);
        let event = RealtimeEvent::UpdateError(UpdateErrorEvent::from_network_error(&error, 42));
        assert_eq!(event.name(), "realtimeUpdateError");
        match event {
            RealtimeEvent::UpdateError(payload) => {
                assert_eq!(payload.http_status, Some(503));
                assert_eq!(payload.network_latency, 42);
                assert_eq!(payload.url, "http://x/data?num=1");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
