use std::sync::Arc;

use tokio::{
    select,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tracing::{debug, warn};

use crate::{
    Result,
    controls::{ControlCommand, Controls},
    notification::NotificationBroadcast,
    output::{AudioOutput, SessionEvent},
    sequencer::{SequenceEvent, SequencePlayer},
    session::PlaybackSession,
    state::{PlaybackState, ReadOnly},
};

/// Single event loop that owns the sequencer. Every mutation of playback
/// state happens on the task running [`Player::player_loop`].
pub struct Player<O> {
    sequencer: SequencePlayer<O>,
    broadcast: Arc<NotificationBroadcast>,
    commands_tx: UnboundedSender<ControlCommand>,
    commands: UnboundedReceiver<ControlCommand>,
    session_events: UnboundedReceiver<SessionEvent>,
    sequence_events: UnboundedReceiver<SequenceEvent>,
}

impl<O: AudioOutput> Player<O> {
    pub fn new(output: O, broadcast: Arc<NotificationBroadcast>) -> Self {
        let (session, session_events) = PlaybackSession::new(output, broadcast.clone());
        let (sequencer, sequence_events) = SequencePlayer::new(session);
        let (commands_tx, commands) = mpsc::unbounded_channel();

        Self {
            sequencer,
            broadcast,
            commands_tx,
            commands,
            session_events,
            sequence_events,
        }
    }

    pub fn controls(&self) -> Controls {
        Controls::new(self.commands_tx.clone())
    }

    pub fn state(&self) -> ReadOnly<PlaybackState> {
        self.sequencer.state()
    }

    pub fn broadcast(&self) -> Arc<NotificationBroadcast> {
        self.broadcast.clone()
    }

    fn handle_command(&mut self, command: ControlCommand) -> bool {
        debug!(?command, "control command");

        let result = match command {
            ControlCommand::PlayOne { item } => self.sequencer.play_one(item),
            ControlCommand::PlayFrom {
                sequence,
                start_index,
            } => self.sequencer.play_from(sequence, start_index),
            ControlCommand::Stop => {
                self.sequencer.stop();
                Ok(())
            }
            ControlCommand::ToggleRepeat => {
                self.sequencer.toggle_repeat();
                Ok(())
            }
            ControlCommand::SetRepeat { repeat } => {
                self.sequencer.set_repeat(repeat);
                Ok(())
            }
            ControlCommand::Quit => return true,
        };

        if let Err(error) = result {
            warn!(%error, "unable to handle control command");
            self.broadcast.send_error(error.to_string());
        }

        false
    }

    fn handle_sequence_event(&mut self, event: SequenceEvent) {
        if let Err(error) = self.sequencer.handle_sequence_event(event) {
            warn!(%error, "unable to advance sequence");
            self.broadcast.send_error(error.to_string());
        }
    }

    pub async fn player_loop(&mut self) -> Result<()> {
        loop {
            select! {
                Some(event) = self.session_events.recv() => {
                    self.sequencer.handle_session_event(event);
                }

                Some(event) = self.sequence_events.recv() => {
                    self.handle_sequence_event(event);
                }

                Some(command) = self.commands.recv() => {
                    if self.handle_command(command) {
                        break;
                    }
                }

                else => break,
            }
        }

        self.sequencer.stop();
        debug!("player loop finished");
        Ok(())
    }
}
