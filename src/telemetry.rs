//! Opt-in tracing setup for hosts embedding realtime chart sessions.
//!
//! Hosts that already install a subscriber can ignore this module.

/// Installs a compact `tracing` subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Returns `false` when the `telemetry` feature is off or a global subscriber is already set.
#[must_use]
pub fn init_default_tracing() -> bool {
    #[cfg(feature = "telemetry")]
    {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chart_realtime=debug"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init()
            .is_ok()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        false
    }
}
