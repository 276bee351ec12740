use crate::controls::ControlCommand;
use crate::notification::Notification;
use snafu::prelude::*;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Audio url is empty"))]
    EmptyUrl,
    #[snafu(display("Unsupported audio url: {url}"))]
    UnsupportedUrl {
        url: String,
    },
    #[snafu(display("Unable to get audio from {url}: {message}"))]
    Fetch {
        url: String,
        message: String,
    },
    #[snafu(display("Unable to decode audio: {message}"))]
    Decode {
        message: String,
    },
    #[snafu(display("{message}"))]
    StreamError {
        message: String,
    },
    #[snafu(display("Playback was preempted by a newer request"))]
    Preempted,
    #[snafu(display("Start index {index} is out of range for a sequence of {len} items"))]
    StartIndexOutOfRange {
        index: usize,
        len: usize,
    },
    #[snafu(display("Unable to start {id} while another start is in flight"))]
    StartInFlight {
        id: String,
    },
    #[snafu(display("Duplicate item in sequence: {id}"))]
    DuplicateItem {
        id: String,
    },
    #[snafu(display("Unable to broadcast notification"))]
    Notification,
    #[snafu(display("Player is no longer running"))]
    Closed,
    SendError,
}

impl Error {
    /// Preemption is the expected result of a newer stop/play racing an
    /// in-flight start and is never shown to the listener.
    pub fn is_preemption(&self) -> bool {
        matches!(self, Error::Preempted)
    }
}

impl From<tokio::sync::mpsc::error::SendError<ControlCommand>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<ControlCommand>) -> Self {
        Error::SendError
    }
}

impl From<tokio::sync::watch::error::RecvError> for Error {
    fn from(_: tokio::sync::watch::error::RecvError) -> Self {
        Error::Closed
    }
}

impl From<tokio::sync::broadcast::error::SendError<Notification>> for Error {
    fn from(_value: tokio::sync::broadcast::error::SendError<Notification>) -> Self {
        Self::Notification
    }
}

impl From<rodio::StreamError> for Error {
    fn from(value: rodio::StreamError) -> Self {
        Self::StreamError {
            message: value.to_string(),
        }
    }
}

impl From<rodio::decoder::DecoderError> for Error {
    fn from(value: rodio::decoder::DecoderError) -> Self {
        Self::Decode {
            message: value.to_string(),
        }
    }
}
