use quran_player_models::PlayableItem;
use tokio::sync::mpsc::UnboundedSender;

use crate::{Result, sequence::Sequence};

#[derive(Debug)]
pub enum ControlCommand {
    PlayOne { item: PlayableItem },
    PlayFrom { sequence: Sequence, start_index: usize },
    Stop,
    ToggleRepeat,
    SetRepeat { repeat: bool },
    Quit,
}

/// Cloneable handle for driving a running [`crate::player::Player`].
#[derive(Debug, Clone)]
pub struct Controls {
    tx: UnboundedSender<ControlCommand>,
}

impl Controls {
    pub fn new(tx: UnboundedSender<ControlCommand>) -> Self {
        Self { tx }
    }

    pub fn play_one(&self, item: PlayableItem) -> Result<()> {
        self.send(ControlCommand::PlayOne { item })
    }

    pub fn play_from(&self, sequence: Sequence, start_index: usize) -> Result<()> {
        self.send(ControlCommand::PlayFrom {
            sequence,
            start_index,
        })
    }

    pub fn stop(&self) -> Result<()> {
        self.send(ControlCommand::Stop)
    }

    pub fn toggle_repeat(&self) -> Result<()> {
        self.send(ControlCommand::ToggleRepeat)
    }

    pub fn set_repeat(&self, repeat: bool) -> Result<()> {
        self.send(ControlCommand::SetRepeat { repeat })
    }

    pub fn quit(&self) -> Result<()> {
        self.send(ControlCommand::Quit)
    }

    fn send(&self, command: ControlCommand) -> Result<()> {
        self.tx.send(command)?;
        Ok(())
    }
}
