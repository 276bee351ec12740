use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    Result,
    error::Error,
    output::{AudioHandle, AudioOutput, HandleEvents, SessionEvent},
    session::PlaybackSession,
    sequencer::{SequenceEvent, SequencePlayer},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Opened(String),
    Looping(String, bool),
    Started(String),
    Rewound(String),
    TornDown(String),
}

#[derive(Debug)]
struct Slot {
    url: String,
    looping: bool,
    producing: bool,
    torn_down: bool,
    events: HandleEvents,
}

#[derive(Debug, Default)]
struct MockState {
    journal: Vec<Entry>,
    slots: Vec<Slot>,
    fail_start: HashSet<String>,
    fail_open: HashSet<String>,
    max_producing: usize,
}

impl MockState {
    fn producing_count(&self) -> usize {
        self.slots.iter().filter(|s| s.producing && !s.torn_down).count()
    }
}

/// In-memory output that journals every call it receives.
#[derive(Debug, Clone, Default)]
pub struct MockOutput {
    state: Arc<Mutex<MockState>>,
}

impl MockOutput {
    pub fn fail_start(&self, url: &str) {
        self.state.lock().unwrap().fail_start.insert(url.to_string());
    }

    pub fn fail_open(&self, url: &str) {
        self.state.lock().unwrap().fail_open.insert(url.to_string());
    }

    pub fn journal(&self) -> Vec<Entry> {
        self.state.lock().unwrap().journal.clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Opened(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn producing(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .slots
            .iter()
            .filter(|s| s.producing && !s.torn_down)
            .map(|s| s.url.clone())
            .collect()
    }

    pub fn max_producing(&self) -> usize {
        self.state.lock().unwrap().max_producing
    }

    /// Let the most recent live handle for `url` reach the end of its audio.
    pub fn finish(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state
            .slots
            .iter()
            .rposition(|s| s.url == url && !s.torn_down)
        else {
            return;
        };

        if state.slots[index].looping {
            state.journal.push(Entry::Rewound(url.to_string()));
            return;
        }

        state.slots[index].producing = false;
        let events = state.slots[index].events.clone();
        drop(state);
        events.ended();
    }

    /// Report `url` as ended even if it has been torn down already, the way
    /// a late device callback would.
    pub fn finish_late(&self, url: &str) {
        let state = self.state.lock().unwrap();
        let Some(slot) = state.slots.iter().rev().find(|s| s.url == url) else {
            return;
        };
        let events = slot.events.clone();
        drop(state);
        events.ended();
    }
}

impl AudioOutput for MockOutput {
    fn open(&mut self, url: &str, events: HandleEvents) -> Result<Box<dyn AudioHandle>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open.contains(url) {
            return Err(Error::StreamError {
                message: "no output device".to_string(),
            });
        }

        state.journal.push(Entry::Opened(url.to_string()));
        state.slots.push(Slot {
            url: url.to_string(),
            looping: false,
            producing: false,
            torn_down: false,
            events,
        });

        Ok(Box::new(MockHandle {
            index: state.slots.len() - 1,
            url: url.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct MockHandle {
    index: usize,
    url: String,
    state: Arc<Mutex<MockState>>,
}

impl AudioHandle for MockHandle {
    fn set_looping(&mut self, looping: bool) {
        let mut state = self.state.lock().unwrap();
        state.slots[self.index].looping = looping;
        state.journal.push(Entry::Looping(self.url.clone(), looping));
    }

    fn start(&mut self) -> BoxFuture<'static, Result<()>> {
        let state = self.state.clone();
        let index = self.index;
        let url = self.url.clone();

        async move {
            let mut state = state.lock().unwrap();
            if state.fail_start.contains(&url) {
                return Err(Error::Fetch {
                    url,
                    message: "404 Not Found".to_string(),
                });
            }
            if state.slots[index].torn_down {
                return Err(Error::Preempted);
            }

            state.slots[index].producing = true;
            state.journal.push(Entry::Started(url));
            let producing = state.producing_count();
            state.max_producing = state.max_producing.max(producing);
            Ok(())
        }
        .boxed()
    }

    fn teardown(&mut self) {
        let mut state = self.state.lock().unwrap();
        let slot = &mut state.slots[self.index];
        if slot.torn_down {
            return;
        }
        slot.torn_down = true;
        slot.producing = false;
        state.journal.push(Entry::TornDown(self.url.clone()));
    }
}

async fn yield_a_few() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

/// Run spawned starts and feed their events back until nothing is pending.
pub async fn settle_session(
    session: &mut PlaybackSession<MockOutput>,
    events: &mut UnboundedReceiver<SessionEvent>,
) {
    loop {
        yield_a_few().await;
        let mut progressed = false;
        while let Ok(event) = events.try_recv() {
            session.handle_event(event);
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
}

pub async fn settle(
    player: &mut SequencePlayer<MockOutput>,
    session_events: &mut UnboundedReceiver<SessionEvent>,
    sequence_events: &mut UnboundedReceiver<SequenceEvent>,
) {
    loop {
        yield_a_few().await;
        let mut progressed = false;
        while let Ok(event) = session_events.try_recv() {
            player.handle_session_event(event);
            progressed = true;
        }
        while let Ok(event) = sequence_events.try_recv() {
            player.handle_sequence_event(event).unwrap();
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
}
