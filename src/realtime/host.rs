use crate::realtime::types::{FeedOutcome, FeedUpdate, RealtimeChartArgs, RefreshSummary};

/// The chart a realtime session is attached to.
///
/// Covers the collaborators the scheduler does not own: the chart's
/// configuration, the data-feed parser plus renderer, and the "clear chart"
/// action. Methods are called from the session's driver task and must not
/// block for long.
pub trait ChartHost: Send + Sync + 'static {
    /// Current realtime attributes of the chart configuration.
    fn realtime_args(&self) -> RealtimeChartArgs;

    /// Parses and applies one payload, reporting draw latency and the next
    /// continuity token when known.
    fn apply_feed(&self, update: FeedUpdate<'_>) -> FeedOutcome;

    fn clear_chart(&self);

    /// Fire-and-continue notification that a pulled refresh was applied.
    fn refresh_complete(&self, _summary: &RefreshSummary) {}
}
