use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use quran_player_controls::{
    controls::Controls,
    notification::{Notification, NotificationBroadcast},
    player::Player,
    sequence::Sequence,
    sink::{OutputConfig, RodioOutput},
    state::{PlaybackState, ReadOnly},
};
use quran_player_models::{Selection, Verse};
use snafu::prelude::*;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{Receiver, error::RecvError},
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long)]
    /// Log level
    verbosity: Option<tracing::Level>,

    #[clap(long, env = "QURAN_PLAYER_CACHE_DIR")]
    /// Directory for downloaded recitations. Defaults to the user cache directory.
    cache_dir: Option<PathBuf>,

    #[clap(long, default_value_t = false)]
    /// Always stream audio, never read or write the cache.
    no_cache: bool,

    #[clap(long, default_value_t = 1.0, env = "QURAN_PLAYER_VOLUME")]
    /// Output volume between 0 and 1.
    volume: f32,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play verses from a verse file
    Play {
        /// JSON array of verses as delivered by the content service.
        file: PathBuf,

        #[clap(short, long, default_value = "all")]
        /// all, verse:<chapter>:<verse>, chapter:<chapter> or juz:<n>
        selection: Selection,

        #[clap(long, default_value_t = 0)]
        /// Position in the selection to start from.
        start: usize,

        #[clap(short, long, default_value_t = false)]
        /// Repeat the current verse until told otherwise.
        repeat: bool,

        #[clap(short, long, default_value_t = false)]
        /// Keep the player open after the selection has finished.
        wait: bool,
    },
    /// List the verses of a selection and whether they have audio
    List {
        file: PathBuf,

        #[clap(short, long, default_value = "all")]
        selection: Selection,
    },
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to read {}: {source}", path.display()))]
    ReadVerses {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Unable to parse {}: {source}", path.display()))]
    ParseVerses {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("Start position {start} is past the end of {len} verses"))]
    StartOutOfRange { start: usize, len: usize },
    #[snafu(display("{error}"))]
    PlayerError { error: String },
}

impl From<quran_player_controls::error::Error> for Error {
    fn from(error: quran_player_controls::error::Error) -> Self {
        Error::PlayerError {
            error: error.to_string(),
        }
    }
}

pub async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Play {
            file,
            selection,
            start,
            repeat,
            wait,
        } => {
            let verses = load_verses(&file).await?;
            let sequence = Sequence::from_verses(&verses, selection)?;

            if !has_audio_from(&sequence, start)? {
                println!("No audio available for {selection} from position {start}.");
                return Ok(());
            }

            let audio_cache_dir = if cli.no_cache {
                None
            } else {
                cli.cache_dir.or_else(default_cache_dir)
            };
            let config = OutputConfig {
                volume: cli.volume,
                audio_cache_dir,
            };

            let broadcast = Arc::new(NotificationBroadcast::new());
            let output = RodioOutput::new(config, broadcast.clone());
            let mut player = Player::new(output, broadcast.clone());
            let controls = player.controls();

            controls.set_repeat(repeat)?;
            controls.play_from(sequence.clone(), start)?;

            let labels: HashMap<String, String> = verses
                .iter()
                .map(|verse| (verse.key().to_string(), verse.translation_text.clone()))
                .collect();

            let state = player.state();
            let runs_ended = state.read().runs_ended;
            tokio::spawn(print_state(
                state,
                runs_ended,
                labels,
                controls.clone(),
                wait,
            ));
            tokio::spawn(print_notifications(broadcast.subscribe()));
            tokio::spawn(read_commands(sequence, controls.clone()));
            tokio::spawn(quit_on_ctrl_c(controls));

            player.player_loop().await?;
            Ok(())
        }
        Commands::List { file, selection } => {
            let verses = load_verses(&file).await?;
            let sequence = Sequence::from_verses(&verses, selection)?;

            for (index, item) in sequence.items().iter().enumerate() {
                let audio = if item.has_audio() { "audio" } else { "-" };
                println!("{index:>4}  {:<8} {audio}", item.id);
            }
            println!(
                "{selection}: {} verses, {} with audio",
                sequence.len(),
                sequence.playable_count()
            );
            Ok(())
        }
    }
}

async fn load_verses(path: &Path) -> Result<Vec<Verse>, Error> {
    let contents = tokio::fs::read(path)
        .await
        .context(ReadVersesSnafu { path })?;

    serde_json::from_slice(&contents).context(ParseVersesSnafu { path })
}

/// Whether anything in `sequence` has audio at or after `start`.
fn has_audio_from(sequence: &Sequence, start: usize) -> Result<bool, Error> {
    if sequence.is_empty() {
        return Ok(false);
    }
    ensure!(
        start < sequence.len(),
        StartOutOfRangeSnafu {
            start,
            len: sequence.len(),
        }
    );
    Ok(sequence.next_playable(start).is_some())
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("quran-player").join("audio"))
}

/// Print state changes until a run ends. With `wait` keep going until the
/// player shuts down.
async fn print_state(
    mut state: ReadOnly<PlaybackState>,
    mut runs_ended: u64,
    labels: HashMap<String, String>,
    controls: Controls,
    wait: bool,
) {
    let mut shown: Option<String> = None;
    let mut repeat = state.read().repeat;

    while let Ok(current) = state.changed().await {
        if current.current_item_id != shown {
            if let Some(id) = &current.current_item_id {
                let label = labels.get(id).map(String::as_str).unwrap_or_default();
                println!("▶ {id}  {label}");
            }
            shown = current.current_item_id.clone();
        }

        if current.repeat != repeat {
            repeat = current.repeat;
            println!("repeat {}", if repeat { "on" } else { "off" });
        }

        if current.runs_ended != runs_ended {
            runs_ended = current.runs_ended;
            println!("■ stopped");
            if !wait {
                _ = controls.quit();
                return;
            }
        }
    }
}

async fn print_notifications(mut receiver: Receiver<Notification>) {
    loop {
        match receiver.recv().await {
            Ok(notification) => eprintln!("{notification}"),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        }
    }
}

const HELP: &str =
    "commands: s (stop), r (toggle repeat), p <n> (play from n), o <n> (play only n), q (quit)";

async fn read_commands(sequence: Sequence, controls: Controls) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let index = words.next().and_then(|word| word.parse::<usize>().ok());

        let sent = match (command, index) {
            ("s" | "stop", _) => controls.stop(),
            ("r" | "repeat", _) => controls.toggle_repeat(),
            ("q" | "quit", _) => controls.quit(),
            ("p" | "play", Some(index)) => controls.play_from(sequence.clone(), index),
            ("o" | "one", Some(index)) => match sequence.get(index) {
                Some(item) => controls.play_one(item.clone()),
                None => {
                    println!("no verse at position {index}");
                    Ok(())
                }
            },
            ("", _) => Ok(()),
            _ => {
                println!("{HELP}");
                Ok(())
            }
        };

        if sent.is_err() {
            return;
        }
    }
}

async fn quit_on_ctrl_c(controls: Controls) {
    if tokio::signal::ctrl_c().await.is_ok() {
        _ = controls.quit();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quran_player_models::PlayableItem;
    use tokio::time::timeout;

    use super::*;

    fn sequence() -> Sequence {
        Sequence::new(vec![
            PlayableItem::new("1:1", Some("001001.mp3".to_string())),
            PlayableItem::new("1:2", None),
        ])
        .unwrap()
    }

    #[test]
    fn start_position_is_checked_before_playing() {
        let sequence = sequence();

        assert!(has_audio_from(&sequence, 0).unwrap());
        assert!(!has_audio_from(&sequence, 1).unwrap());
        assert!(matches!(
            has_audio_from(&sequence, 2),
            Err(Error::StartOutOfRange { start: 2, len: 2 })
        ));
        assert!(!has_audio_from(&Sequence::default(), 0).unwrap());
    }

    #[tokio::test]
    async fn quits_once_the_run_has_ended() {
        let broadcast = Arc::new(NotificationBroadcast::new());
        let output = RodioOutput::new(OutputConfig::default(), broadcast.clone());
        let mut player = Player::new(output, broadcast);
        let controls = player.controls();
        let state = player.state();
        let runs_ended = state.read().runs_ended;

        // nothing playable from here, so no device is ever opened
        controls.play_from(sequence(), 1).unwrap();
        let printer = tokio::spawn(print_state(
            state,
            runs_ended,
            HashMap::new(),
            controls,
            false,
        ));

        timeout(Duration::from_secs(5), player.player_loop())
            .await
            .expect("player did not quit")
            .unwrap();
        printer.await.unwrap();
    }
}
