//! Adaptive real-time refresh for chart widgets.
//!
//! A session polls a data endpoint on a drift-compensated cadence, feeds each
//! payload to the chart, and reacts to the chart's render lifecycle.

mod commands;
mod error;
pub mod realtime;
mod state;
pub mod telemetry;

pub use commands::realtime_session::{
    attach_realtime, attach_realtime_with_transport, detach_realtime, RealtimeSlot,
};
pub use error::{ConfigError, NetworkError, NetworkErrorKind, RealtimeError};
pub use realtime::fetch::{HttpTransport, Transport};
pub use realtime::host::ChartHost;
pub use realtime::lifecycle::{spawn_realtime, LifecycleSignal};
pub use realtime::types::{
    FeedOutcome, FeedSource, FeedUpdate, RawPayload, RealtimeChartArgs, RealtimeEvent,
    RefreshConfig, RefreshState, RefreshStatusSnapshot, RefreshSummary, UpdateCompleteEvent,
    UpdateErrorEvent, UpdateStoppedEvent,
};
pub use state::RealtimeHandle;
pub use telemetry::init_default_tracing;
