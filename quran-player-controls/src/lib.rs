//! Recitation playback for verses, chapters and juz walks.
//!
//! A [`player::Player`] runs one event loop that owns a
//! [`sequencer::SequencePlayer`], which in turn owns the single
//! [`session::PlaybackSession`] allowed to produce sound. Hosts drive it
//! through [`controls::Controls`] and watch [`state::PlaybackState`].

pub mod controls;
pub mod error;
pub mod notification;
pub mod output;
pub mod player;
pub mod sequence;
pub mod sequencer;
pub mod session;
pub mod sink;
pub mod state;

#[cfg(test)]
mod testing;

pub use quran_player_models as models;

pub type Result<T, E = error::Error> = std::result::Result<T, E>;
