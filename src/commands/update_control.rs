use crate::error::RealtimeError;
use crate::realtime::lifecycle::{DriverMessage, LifecycleSignal};
use crate::realtime::types::{FeedSource, RawPayload};
use crate::state::RealtimeHandle;
use std::fmt::Display;
use tokio::sync::oneshot;

impl RealtimeHandle {
    /// Forwards a chart lifecycle notification to the driver.
    pub fn signal(&self, signal: LifecycleSignal) -> Result<(), RealtimeError> {
        self.sender
            .send(DriverMessage::Lifecycle(signal))
            .map_err(|_| RealtimeError::DriverGone)
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<bool>) -> DriverMessage,
    ) -> Result<bool, RealtimeError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .map_err(|_| RealtimeError::DriverGone)?;
        response.await.map_err(|_| RealtimeError::DriverGone)
    }

    /// Pauses refreshing and raises the stopped event. Returns whether the session was active.
    pub async fn stop_update(&self, reason: impl Into<String>) -> Result<bool, RealtimeError> {
        let reason = reason.into();
        self.request(|reply| DriverMessage::StopUpdate { reason, reply })
            .await
    }

    /// Resumes a paused session with an immediate fetch.
    pub async fn restart_update(&self) -> Result<bool, RealtimeError> {
        self.request(|reply| DriverMessage::RestartUpdate { reply })
            .await
    }

    pub fn is_update_active(&self) -> bool {
        self.status.read().state.is_update_active()
    }

    /// Pushes a single point, encoded the way a data stream would send it.
    pub async fn set_data(
        &self,
        value: impl Display,
        label: impl Display,
    ) -> Result<bool, RealtimeError> {
        let payload = RawPayload::from(format!("value={value}&label={label}"));
        self.request(|reply| DriverMessage::PushData {
            payload,
            source: FeedSource::SetData,
            reply,
        })
        .await
    }

    /// Pushes a raw stream payload through the data feed.
    pub async fn feed_data(&self, raw: impl Into<String>) -> Result<bool, RealtimeError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(RealtimeError::InvalidArgument(
                "feed data must not be empty".to_string(),
            ));
        }
        let payload = RawPayload::from(raw);
        self.request(|reply| DriverMessage::PushData {
            payload,
            source: FeedSource::FeedData,
            reply,
        })
        .await
    }

    pub async fn clear_chart(&self) -> Result<bool, RealtimeError> {
        self.request(|reply| DriverMessage::ClearChart { reply })
            .await
    }

    /// Disposes the session and waits for the driver task to finish.
    pub async fn shutdown(&self) {
        let _ = self.signal(LifecycleSignal::BeforeDispose);
        let join_handle = self.join_handle.lock().await.take();
        if let Some(join_handle) = join_handle {
            let _ = join_handle.await;
        }
    }
}
