use crate::realtime::fetch::Transport;
use crate::realtime::host::ChartHost;
use crate::realtime::scheduler::{FetchCompletion, RefreshScheduler};
use crate::realtime::types::{
    FeedSource, RawPayload, RealtimeEvent, RefreshState, UpdateCompleteEvent, UpdateStoppedEvent,
};
use crate::state::{new_shared_status, RealtimeHandle, EVENT_CHANNEL_CAPACITY};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

/// Chart lifecycle notifications a realtime session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    BeforeDataUpdate,
    BeforeRender,
    RenderComplete { draw_latency: Option<Duration> },
    DataUpdated { draw_latency: Option<Duration> },
    BeforeDispose,
}

#[derive(Debug)]
pub(crate) enum DriverMessage {
    Lifecycle(LifecycleSignal),
    StopUpdate {
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    RestartUpdate {
        reply: oneshot::Sender<bool>,
    },
    PushData {
        payload: RawPayload,
        source: FeedSource,
        reply: oneshot::Sender<bool>,
    },
    ClearChart {
        reply: oneshot::Sender<bool>,
    },
}

/// Translates lifecycle signals and control commands into scheduler transitions.
pub struct LifecycleBinder<T, H> {
    scheduler: RefreshScheduler<T, H>,
    host: Arc<H>,
    initialized: bool,
    last_pushed: Option<String>,
}

impl<T: Transport, H: ChartHost> LifecycleBinder<T, H> {
    pub fn new(scheduler: RefreshScheduler<T, H>, host: Arc<H>) -> Self {
        Self {
            scheduler,
            host,
            initialized: false,
            last_pushed: None,
        }
    }

    pub fn scheduler(&self) -> &RefreshScheduler<T, H> {
        &self.scheduler
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn handle_signal(&mut self, signal: LifecycleSignal) {
        if self.scheduler.state() == RefreshState::Disposed {
            return;
        }

        match signal {
            LifecycleSignal::BeforeDataUpdate | LifecycleSignal::BeforeRender => {
                if self.scheduler.cancel_pending() {
                    debug!(?signal, "cancelled pending refresh ahead of render");
                }
            }
            LifecycleSignal::RenderComplete { draw_latency }
            | LifecycleSignal::DataUpdated { draw_latency } => {
                if !self.initialized {
                    self.initialize();
                } else if !self.scheduler.draw_complete(draw_latency) {
                    self.scheduler.restart_after_render(draw_latency);
                }
            }
            LifecycleSignal::BeforeDispose => self.scheduler.dispose(),
        }
    }

    /// Reads the chart's realtime attributes and starts the session when they allow it.
    fn initialize(&mut self) {
        match self.host.realtime_args().normalize() {
            Ok(config) => {
                self.initialized = true;
                self.scheduler.start(config);
            }
            Err(reason) => {
                debug!(%reason, "realtime session stays inert");
            }
        }
    }

    pub fn stop_update(&mut self, reason: String) -> bool {
        if !self.scheduler.pause() {
            return false;
        }
        self.scheduler
            .emit(RealtimeEvent::UpdateStopped(UpdateStoppedEvent { source: reason }));
        true
    }

    pub fn restart_update(&mut self) -> bool {
        self.scheduler.resume()
    }

    pub fn push_data(&mut self, payload: RawPayload, source: FeedSource) -> bool {
        let Some(outcome) = self.scheduler.push_payload(&payload, source) else {
            return false;
        };

        let data = payload.to_text();
        let prev_data = self.last_pushed.replace(data.clone());
        self.scheduler
            .emit(RealtimeEvent::UpdateComplete(UpdateCompleteEvent {
                data,
                update_object: outcome.update_object,
                prev_data,
                source: source.as_str().to_string(),
                url: None,
            }));
        true
    }

    fn handle_message(&mut self, message: DriverMessage) {
        match message {
            DriverMessage::Lifecycle(signal) => self.handle_signal(signal),
            DriverMessage::StopUpdate { reason, reply } => {
                let _ = reply.send(self.stop_update(reason));
            }
            DriverMessage::RestartUpdate { reply } => {
                let _ = reply.send(self.restart_update());
            }
            DriverMessage::PushData {
                payload,
                source,
                reply,
            } => {
                let _ = reply.send(self.push_data(payload, source));
            }
            DriverMessage::ClearChart { reply } => {
                let _ = reply.send(self.scheduler.clear_chart());
            }
        }
    }

    /// Drives the session until it is disposed or every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<DriverMessage>,
        mut completions: mpsc::UnboundedReceiver<FetchCompletion>,
    ) {
        loop {
            tokio::select! {
                biased;
                message = inbox.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => self.scheduler.dispose(),
                },
                Some(completion) = completions.recv() => {
                    self.scheduler.on_fetch_complete(completion);
                }
                _ = self.scheduler.timer_fired() => self.scheduler.on_timer_fire(),
            }

            if self.scheduler.state() == RefreshState::Disposed {
                break;
            }
        }
        debug!("realtime driver stopped");
    }
}

/// Spawns the driver task for one chart and returns the host-side handle.
pub fn spawn_realtime<T, H>(host: Arc<H>, transport: Arc<T>) -> RealtimeHandle
where
    T: Transport,
    H: ChartHost,
{
    let (sender, inbox) = mpsc::unbounded_channel();
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let status = new_shared_status();

    let scheduler = RefreshScheduler::new(
        Arc::clone(&host),
        transport,
        events.clone(),
        Arc::clone(&status),
        completions_tx,
    );
    let binder = LifecycleBinder::new(scheduler, host);
    let join_handle = tokio::spawn(binder.run(inbox, completions_rx));

    RealtimeHandle {
        sender,
        status,
        events,
        join_handle: Arc::new(tokio::sync::Mutex::new(Some(join_handle))),
    }
}
