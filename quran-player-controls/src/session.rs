use std::sync::Arc;

use snafu::ensure;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tracing::{debug, instrument, warn};

use crate::{
    Result,
    error::{EmptyUrlSnafu, Error},
    notification::NotificationBroadcast,
    output::{AudioHandle, AudioOutput, HandleEvents, HandleId, SessionEvent},
};

/// How a handle's audio came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Failed,
}

pub type OnEnded = Box<dyn FnOnce(Outcome) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Another start was still in flight.
    Dropped,
}

struct Live {
    id: HandleId,
    url: String,
    handle: Box<dyn AudioHandle>,
    events: HandleEvents,
    on_ended: Option<OnEnded>,
    start_task: Option<JoinHandle<()>>,
    started: bool,
}

impl Drop for Live {
    fn drop(&mut self) {
        self.events.detach();
        if let Some(task) = self.start_task.take() {
            task.abort();
        }
        self.handle.teardown();
        debug!(id = %self.id, url = %self.url, "released audio handle");
    }
}

/// Owns the one audio handle that may produce sound.
pub struct PlaybackSession<O> {
    output: O,
    live: Option<Live>,
    repeat: bool,
    starting: bool,
    next_id: u64,
    events_tx: UnboundedSender<SessionEvent>,
    broadcast: Arc<NotificationBroadcast>,
}

impl<O: AudioOutput> PlaybackSession<O> {
    pub fn new(
        output: O,
        broadcast: Arc<NotificationBroadcast>,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = Self {
            output,
            live: None,
            repeat: false,
            starting: false,
            next_id: 0,
            events_tx,
            broadcast,
        };

        (session, events_rx)
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn is_starting(&self) -> bool {
        self.starting
    }

    /// A handle is loaded, whether or not its start has resolved yet.
    pub fn is_active(&self) -> bool {
        self.live.is_some()
    }

    pub fn is_producing(&self) -> bool {
        self.live.as_ref().is_some_and(|live| live.started)
    }

    pub fn current_url(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.url.as_str())
    }

    pub fn broadcast(&self) -> Arc<NotificationBroadcast> {
        self.broadcast.clone()
    }

    /// Replace whatever is playing with `url`.
    ///
    /// Dropped without side effects while an earlier start is still in
    /// flight. Failures to produce audio are reported through the
    /// notification broadcast and `on_ended`, never through the return value.
    #[instrument(skip(self, on_ended))]
    pub fn play(&mut self, url: &str, on_ended: Option<OnEnded>) -> Result<Admission> {
        if self.starting {
            debug!("start already in flight, dropping request");
            return Ok(Admission::Dropped);
        }
        ensure!(!url.trim().is_empty(), EmptyUrlSnafu);

        self.release();
        self.starting = true;

        let id = self.next_handle_id();
        let events = HandleEvents::new(id, self.events_tx.clone());

        let mut handle = match self.output.open(url, events.clone()) {
            Ok(handle) => handle,
            Err(error) => {
                self.starting = false;
                self.report_failure(id, url, &error);
                if let Some(on_ended) = on_ended {
                    on_ended(Outcome::Failed);
                }
                return Ok(Admission::Accepted);
            }
        };

        handle.set_looping(self.repeat);
        let start = handle.start();
        let tx = self.events_tx.clone();
        let start_task = tokio::spawn(async move {
            let event = match start.await {
                Ok(()) => SessionEvent::Started { id },
                Err(error) => SessionEvent::StartFailed { id, error },
            };
            _ = tx.send(event);
        });

        debug!(%id, "audio handle installed");
        self.live = Some(Live {
            id,
            url: url.to_string(),
            handle,
            events,
            on_ended,
            start_task: Some(start_task),
            started: false,
        });

        Ok(Admission::Accepted)
    }

    /// Tear down the current handle, if any.
    pub fn stop(&mut self) {
        if let Some(live) = self.take_live() {
            debug!(id = %live.id, url = %live.url, "stopping playback");
        }
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
        if let Some(live) = self.live.as_mut() {
            live.handle.set_looping(repeat);
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        let id = event.id();
        if !self.is_current(id) {
            match event {
                SessionEvent::StartFailed { error, .. } | SessionEvent::Failed { error, .. } => {
                    debug!(%id, %error, "playback preempted");
                }
                event => debug!(%id, ?event, "ignoring event from superseded handle"),
            }
            return;
        }

        match event {
            SessionEvent::Started { .. } => {
                self.starting = false;
                if let Some(live) = self.live.as_mut() {
                    live.started = true;
                    live.start_task = None;
                    debug!(%id, url = %live.url, "playback started");
                }
            }
            SessionEvent::StartFailed { error, .. } | SessionEvent::Failed { error, .. } => {
                let Some(mut live) = self.take_live() else {
                    return;
                };
                let on_ended = live.on_ended.take();

                if error.is_preemption() {
                    debug!(%id, "playback preempted");
                } else {
                    self.report_failure(id, &live.url, &error);
                }
                drop(live);

                if let Some(on_ended) = on_ended {
                    on_ended(Outcome::Failed);
                }
            }
            SessionEvent::Ended { .. } => {
                // May arrive before the handle's own `Started`.
                let Some(mut live) = self.take_live() else {
                    return;
                };
                let on_ended = live.on_ended.take();
                let url = live.url.clone();
                drop(live);

                if self.repeat {
                    debug!(%id, %url, "replaying");
                    if let Err(error) = self.play(&url, on_ended) {
                        warn!(%error, "unable to replay");
                    }
                    return;
                }

                debug!(%id, %url, "playback finished");
                if let Some(on_ended) = on_ended {
                    on_ended(Outcome::Finished);
                }
            }
        }
    }

    fn is_current(&self, id: HandleId) -> bool {
        self.live.as_ref().is_some_and(|live| live.id == id)
    }

    /// Whatever start was in flight belonged to the handle being taken.
    fn take_live(&mut self) -> Option<Live> {
        self.starting = false;
        self.live.take()
    }

    fn release(&mut self) {
        drop(self.take_live());
    }

    fn next_handle_id(&mut self) -> HandleId {
        self.next_id += 1;
        HandleId(self.next_id)
    }

    fn report_failure(&self, id: HandleId, url: &str, error: &Error) {
        warn!(%id, url, %error, "playback failed");
        self.broadcast
            .send_error(format!("Unable to play audio: {error}"));
    }
}
