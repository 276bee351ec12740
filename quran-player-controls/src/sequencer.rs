use std::{fmt, sync::Arc};

use quran_player_models::PlayableItem;
use snafu::ensure;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    watch,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    Result,
    error::{StartInFlightSnafu, StartIndexOutOfRangeSnafu},
    notification::{Notification, NotificationBroadcast},
    output::{AudioOutput, SessionEvent},
    sequence::Sequence,
    session::{Admission, OnEnded, Outcome, PlaybackSession},
    state::{PlaybackState, ReadOnly},
};

/// Tags one playback run. Completions carrying an older generation are
/// ignored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub enum SequenceEvent {
    ItemFinished {
        generation: Generation,
        outcome: Outcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Playing { cursor: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Completed,
    Stopped,
    Superseded,
    Refused,
}

/// Walks a [`Sequence`], handing one item at a time to the playback session.
pub struct SequencePlayer<O> {
    session: PlaybackSession<O>,
    items: Option<Sequence>,
    cursor: Option<usize>,
    sequencing: bool,
    generation: Generation,
    runs_ended: u64,
    events_tx: UnboundedSender<SequenceEvent>,
    state_tx: watch::Sender<PlaybackState>,
    broadcast: Arc<NotificationBroadcast>,
}

impl<O: AudioOutput> SequencePlayer<O> {
    pub fn new(session: PlaybackSession<O>) -> (Self, UnboundedReceiver<SequenceEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(PlaybackState {
            repeat: session.repeat(),
            ..Default::default()
        });

        let broadcast = session.broadcast();
        let player = Self {
            session,
            items: None,
            cursor: None,
            sequencing: false,
            generation: Generation::default(),
            runs_ended: 0,
            events_tx,
            state_tx,
            broadcast,
        };

        (player, events_rx)
    }

    pub fn state(&self) -> ReadOnly<PlaybackState> {
        self.state_tx.subscribe().into()
    }

    pub fn run_state(&self) -> RunState {
        match self.cursor {
            Some(cursor) => RunState::Playing { cursor },
            None => RunState::Idle,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn session(&self) -> &PlaybackSession<O> {
        &self.session
    }

    pub fn current_item(&self) -> Option<&PlayableItem> {
        let cursor = self.cursor?;
        self.items.as_ref()?.get(cursor)
    }

    /// Play a single item without auto-advancing.
    pub fn play_one(&mut self, item: PlayableItem) -> Result<()> {
        self.start_run(Sequence::single(item), 0, false)
    }

    /// Start a fresh run at `start_index`, discarding any run in flight.
    pub fn play_from(&mut self, sequence: Sequence, start_index: usize) -> Result<()> {
        if !sequence.is_empty() {
            ensure!(
                start_index < sequence.len(),
                StartIndexOutOfRangeSnafu {
                    index: start_index,
                    len: sequence.len(),
                }
            );
        }

        self.start_run(sequence, start_index, true)
    }

    pub fn stop(&mut self) {
        if self.items.is_some() || self.session.is_active() {
            self.end_run(RunEnd::Stopped);
        } else {
            self.session.stop();
        }
        self.publish();
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.session.set_repeat(repeat);
        debug!(repeat, "repeat changed");
        self.publish();
    }

    pub fn toggle_repeat(&mut self) -> bool {
        let repeat = !self.session.repeat();
        self.set_repeat(repeat);
        repeat
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) {
        self.session.handle_event(event);
        self.publish();
    }

    pub fn handle_sequence_event(&mut self, event: SequenceEvent) -> Result<()> {
        match event {
            SequenceEvent::ItemFinished {
                generation,
                outcome,
            } => {
                if generation != self.generation {
                    debug!(%generation, current = %self.generation, "ignoring stale completion");
                    return Ok(());
                }

                let Some(cursor) = self.cursor else {
                    return Ok(());
                };

                if outcome == Outcome::Failed {
                    debug!(cursor, "item failed, moving on");
                }

                self.advance_from(cursor + 1)
            }
        }
    }

    #[instrument(skip(self, sequence), fields(items = sequence.len(), selection = %sequence.selection()))]
    fn start_run(&mut self, sequence: Sequence, start_index: usize, sequencing: bool) -> Result<()> {
        if self.items.is_some() || self.session.is_active() {
            self.end_run(RunEnd::Superseded);
        }

        if sequence.is_empty() {
            debug!("nothing to play");
            self.publish();
            return Ok(());
        }

        info!(
            generation = %self.generation,
            playable = sequence.playable_count(),
            "starting playback run"
        );
        self.items = Some(sequence);
        self.sequencing = sequencing;
        self.advance_from(start_index)
    }

    /// Play the first item at or after `index` that has audio, or end the
    /// run when there is none.
    fn advance_from(&mut self, index: usize) -> Result<()> {
        let next = self.items.as_ref().and_then(|items| {
            items.next_playable(index).map(|(position, item)| {
                let url = item.audio_url().unwrap_or_default().to_string();
                (position, item.id.clone(), url)
            })
        });

        let Some((position, id, url)) = next else {
            if self.items.is_some() {
                self.end_run(RunEnd::Completed);
            }
            self.publish();
            return Ok(());
        };

        if position > index {
            debug!(skipped = position - index, "skipping items without audio");
        }

        self.cursor = Some(position);
        debug!(cursor = position, %id, "playing item");

        let generation = self.generation;
        let events_tx = self.events_tx.clone();
        let on_ended: OnEnded = Box::new(move |outcome| {
            _ = events_tx.send(SequenceEvent::ItemFinished {
                generation,
                outcome,
            });
        });

        let admission = self.session.play(&url, Some(on_ended))?;
        if admission == Admission::Dropped {
            self.end_run(RunEnd::Refused);
            self.publish();
            return StartInFlightSnafu { id }.fail();
        }

        self.publish();
        Ok(())
    }

    fn end_run(&mut self, reason: RunEnd) {
        let last = self.current_item().map(|item| item.id.clone());
        self.session.stop();
        let items = self.items.take();
        let sequencing = std::mem::take(&mut self.sequencing);
        self.cursor = None;
        self.generation = self.generation.next();

        if reason != RunEnd::Superseded {
            self.runs_ended += 1;
        }

        match reason {
            RunEnd::Completed => {
                info!(
                    items = items.as_ref().map(Sequence::len).unwrap_or_default(),
                    "playback run complete"
                );
                let finished = match (&items, last) {
                    (Some(items), _) if sequencing => Some(items.selection().to_string()),
                    (_, Some(id)) => Some(id),
                    _ => None,
                };
                if let Some(finished) = finished {
                    self.broadcast
                        .send_info(format!("Finished playing {finished}"));
                }
            }
            RunEnd::Stopped => info!("playback stopped"),
            RunEnd::Superseded => debug!("playback run superseded"),
            RunEnd::Refused => warn!(?last, "session refused to start item"),
        }
    }

    fn publish(&self) {
        let next = PlaybackState {
            current_item_id: self.current_item().map(|item| item.id.clone()),
            is_playing: self.session.is_active(),
            is_sequencing: self.sequencing,
            repeat: self.session.repeat(),
            runs_ended: self.runs_ended,
        };

        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}
