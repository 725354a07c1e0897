use crate::error::RealtimeError;
use crate::realtime::fetch::{HttpTransport, Transport};
use crate::realtime::host::ChartHost;
use crate::realtime::lifecycle::spawn_realtime;
use crate::realtime::types::RefreshStatusSnapshot;
use crate::state::RealtimeHandle;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const USER_AGENT: &str = concat!("chart-realtime/", env!("CARGO_PKG_VERSION"));

/// Holds at most one realtime session for a chart.
#[derive(Default)]
pub struct RealtimeSlot {
    session: Mutex<Option<RealtimeHandle>>,
}

impl RealtimeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<RealtimeHandle> {
        self.session.lock().await.clone()
    }

    pub async fn status(&self) -> Option<RefreshStatusSnapshot> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(RealtimeHandle::status)
    }
}

/// Attaches a session backed by a reqwest client, replacing any previous one.
pub async fn attach_realtime<H: ChartHost>(
    slot: &RealtimeSlot,
    host: Arc<H>,
) -> Result<RealtimeHandle, RealtimeError> {
    let client = Client::builder().user_agent(USER_AGENT).build()?;
    attach_realtime_with_transport(slot, host, Arc::new(HttpTransport::new(client))).await
}

pub async fn attach_realtime_with_transport<T, H>(
    slot: &RealtimeSlot,
    host: Arc<H>,
    transport: Arc<T>,
) -> Result<RealtimeHandle, RealtimeError>
where
    T: Transport,
    H: ChartHost,
{
    let existing_handle = {
        let mut session_slot = slot.session.lock().await;
        session_slot.take()
    };
    if let Some(handle) = existing_handle {
        debug!("replacing attached realtime session");
        handle.shutdown().await;
    }

    let handle = spawn_realtime(host, transport);
    {
        let mut session_slot = slot.session.lock().await;
        *session_slot = Some(handle.clone());
    }

    Ok(handle)
}

/// Disposes the attached session, if any. Returns whether one was running.
pub async fn detach_realtime(slot: &RealtimeSlot) -> bool {
    let existing_handle = {
        let mut session_slot = slot.session.lock().await;
        session_slot.take()
    };

    match existing_handle {
        Some(handle) => {
            let was_running = handle.is_running();
            handle.shutdown().await;
            was_running
        }
        None => false,
    }
}
