use crate::realtime::types::{RealtimeEvent, RefreshStatusSnapshot};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::realtime::lifecycle::DriverMessage;

pub type SharedStatus = Arc<RwLock<RefreshStatusSnapshot>>;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Host-side handle to one chart's realtime session.
///
/// Cloning is cheap; every clone talks to the same driver task.
#[derive(Clone)]
pub struct RealtimeHandle {
    pub(crate) sender: mpsc::UnboundedSender<DriverMessage>,
    pub(crate) status: SharedStatus,
    pub(crate) events: broadcast::Sender<RealtimeEvent>,
    pub(crate) join_handle: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl RealtimeHandle {
    pub fn status(&self) -> RefreshStatusSnapshot {
        self.status.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

pub fn new_shared_status() -> SharedStatus {
    Arc::new(RwLock::new(RefreshStatusSnapshot::idle(Some(
        "waiting for first render".to_string(),
    ))))
}
