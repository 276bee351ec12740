//! The seam between the playback session and whatever actually produces
//! sound.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::{Result, error::Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a handle can report back to its session.
#[derive(Debug)]
pub enum SessionEvent {
    Started { id: HandleId },
    StartFailed { id: HandleId, error: Error },
    Ended { id: HandleId },
    Failed { id: HandleId, error: Error },
}

impl SessionEvent {
    pub fn id(&self) -> HandleId {
        match self {
            SessionEvent::Started { id }
            | SessionEvent::StartFailed { id, .. }
            | SessionEvent::Ended { id }
            | SessionEvent::Failed { id, .. } => *id,
        }
    }
}

/// Listener side of a handle. Once detached, nothing it reports reaches the
/// session.
#[derive(Debug, Clone)]
pub struct HandleEvents {
    id: HandleId,
    tx: UnboundedSender<SessionEvent>,
    detached: Arc<AtomicBool>,
}

impl HandleEvents {
    pub(crate) fn new(id: HandleId, tx: UnboundedSender<SessionEvent>) -> Self {
        Self {
            id,
            tx,
            detached: Default::default(),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Natural end of the audio. Only reported when the handle is not looping.
    pub fn ended(&self) {
        self.emit(SessionEvent::Ended { id: self.id });
    }

    /// Playback broke down after it had started.
    pub fn failed(&self, error: Error) {
        self.emit(SessionEvent::Failed { id: self.id, error });
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    fn emit(&self, event: SessionEvent) {
        if self.is_detached() {
            debug!(id = %self.id, ?event, "handle detached, dropping event");
            return;
        }

        if self.tx.send(event).is_err() {
            debug!(id = %self.id, "session is gone, dropping event");
        }
    }
}

/// Builds audio handles. Implementations own the device side of playback.
pub trait AudioOutput {
    /// Construct a handle bound to `url`. Nothing is audible until the future
    /// returned by [`AudioHandle::start`] resolves.
    fn open(&mut self, url: &str, events: HandleEvents) -> Result<Box<dyn AudioHandle>>;
}

pub trait AudioHandle {
    /// Loop the loaded audio instead of reporting its end. Takes effect on a
    /// live handle without restarting it.
    fn set_looping(&mut self, looping: bool);

    /// Begin producing sound. The future runs detached from the handle and
    /// may be aborted at any point by a teardown.
    fn start(&mut self) -> BoxFuture<'static, Result<()>>;

    /// Pause, rewind and release the device side. Must be idempotent.
    fn teardown(&mut self);
}
