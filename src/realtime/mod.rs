pub mod clear_timer;
pub mod fetch;
pub mod host;
pub mod latency;
pub mod lifecycle;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub const REALTIME_UPDATE_ERROR_EVENT: &str = "realtimeUpdateError";
// Historic spelling, kept so existing listeners keep matching.
pub const REALTIME_UPDATE_STOPPED_EVENT: &str = "realimeUpdateStopped";
pub const REALTIME_UPDATE_COMPLETE_EVENT: &str = "RealTimeUpdateComplete";
