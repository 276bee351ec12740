use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use futures::{FutureExt, future::BoxFuture};
use rodio::decoder::DecoderBuilder;
use tokio::fs;
use tracing::{debug, instrument};
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::notification::NotificationBroadcast;
use crate::output::{AudioHandle, AudioOutput, HandleEvents};

const END_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Linear volume between 0 and 1.
    pub volume: f32,
    /// Where downloaded recitations are kept. `None` disables the cache.
    pub audio_cache_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            audio_cache_dir: None,
        }
    }
}

/// Plays through the default output device.
pub struct RodioOutput {
    stream_handle: Option<rodio::OutputStream>,
    http: reqwest::Client,
    broadcast: Arc<NotificationBroadcast>,
    config: OutputConfig,
}

impl RodioOutput {
    pub fn new(config: OutputConfig, broadcast: Arc<NotificationBroadcast>) -> Self {
        Self {
            stream_handle: None,
            http: reqwest::Client::new(),
            broadcast,
            config,
        }
    }

    fn mixer(&mut self) -> Result<&rodio::mixer::Mixer> {
        if self.stream_handle.is_none() {
            let mut stream_handle =
                rodio::OutputStreamBuilder::from_default_device()?.open_stream()?;
            stream_handle.log_on_drop(false);
            self.stream_handle = Some(stream_handle);
        }

        match self.stream_handle.as_ref() {
            Some(stream_handle) => Ok(stream_handle.mixer()),
            None => Err(Error::StreamError {
                message: "no output stream".to_string(),
            }),
        }
    }
}

impl AudioOutput for RodioOutput {
    #[instrument(skip(self, events))]
    fn open(&mut self, url: &str, events: HandleEvents) -> Result<Box<dyn AudioHandle>> {
        let volume = self.config.volume;
        let sink = rodio::Sink::connect_new(self.mixer()?);
        sink.pause();
        set_volume(&sink, volume);

        Ok(Box::new(RodioHandle {
            url: url.to_string(),
            sink: Arc::new(sink),
            looping: Default::default(),
            torn_down: Default::default(),
            events,
            http: self.http.clone(),
            broadcast: self.broadcast.clone(),
            audio_cache_dir: self.config.audio_cache_dir.clone(),
        }))
    }
}

struct RodioHandle {
    url: String,
    sink: Arc<rodio::Sink>,
    looping: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
    events: HandleEvents,
    http: reqwest::Client,
    broadcast: Arc<NotificationBroadcast>,
    audio_cache_dir: Option<PathBuf>,
}

impl AudioHandle for RodioHandle {
    fn set_looping(&mut self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    fn start(&mut self) -> BoxFuture<'static, Result<()>> {
        let url = self.url.clone();
        let sink = self.sink.clone();
        let looping = self.looping.clone();
        let torn_down = self.torn_down.clone();
        let events = self.events.clone();
        let http = self.http.clone();
        let broadcast = self.broadcast.clone();
        let cache_path = self
            .audio_cache_dir
            .as_deref()
            .and_then(|dir| cache_path(dir, &url));

        async move {
            let bytes = load_audio(&http, &url, cache_path.as_deref(), &broadcast).await?;
            if torn_down.load(Ordering::Acquire) {
                return Err(Error::Preempted);
            }

            sink.append(decode(bytes.clone())?);
            sink.play();

            tokio::spawn(watch_for_end(sink, bytes, looping, torn_down, events));
            Ok(())
        }
        .boxed()
    }

    fn teardown(&mut self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sink.pause();
        self.sink.stop();
        debug!(url = %self.url, "sink stopped");
    }
}

impl Drop for RodioHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Poll the sink until the queued audio runs out, then either queue it again
/// or report the end.
async fn watch_for_end(
    sink: Arc<rodio::Sink>,
    bytes: Arc<[u8]>,
    looping: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
    events: HandleEvents,
) {
    let mut interval = tokio::time::interval(END_POLL_INTERVAL);

    loop {
        interval.tick().await;

        if torn_down.load(Ordering::Acquire) || events.is_detached() {
            return;
        }
        if !sink.empty() {
            continue;
        }

        if looping.load(Ordering::Acquire) {
            match decode(bytes.clone()) {
                Ok(source) => {
                    sink.append(source);
                    continue;
                }
                Err(error) => {
                    events.failed(error);
                    return;
                }
            }
        }

        events.ended();
        return;
    }
}

fn decode(bytes: Arc<[u8]>) -> Result<rodio::Decoder<Cursor<Arc<[u8]>>>> {
    let source = DecoderBuilder::new()
        .with_data(Cursor::new(bytes))
        .with_seekable(true)
        .build()?;
    Ok(source)
}

enum Location {
    Local(PathBuf),
    Remote,
}

/// Plain filesystem paths and `file://` urls are read straight from disk,
/// `http(s)` urls go through the cache and the network.
fn locate(url: &str) -> Result<Location> {
    match Url::parse(url) {
        Err(_) => Ok(Location::Local(PathBuf::from(url))),
        Ok(parsed) => match parsed.scheme() {
            "http" | "https" => Ok(Location::Remote),
            "file" => parsed
                .to_file_path()
                .map(Location::Local)
                .map_err(|()| Error::UnsupportedUrl {
                    url: url.to_string(),
                }),
            _ => Err(Error::UnsupportedUrl {
                url: url.to_string(),
            }),
        },
    }
}

async fn load_audio(
    http: &reqwest::Client,
    url: &str,
    cache_path: Option<&Path>,
    broadcast: &NotificationBroadcast,
) -> Result<Arc<[u8]>> {
    if let Location::Local(path) = locate(url)? {
        let bytes = fs::read(&path).await.map_err(|e| Error::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        return Ok(bytes.into());
    }

    if let Some(path) = cache_path
        && let Ok(bytes) = fs::read(path).await
    {
        debug!(url, path = %path.display(), "audio cache hit");
        return Ok(bytes.into());
    }

    let bytes = fetch(http, url).await?;

    if let Some(path) = cache_path {
        store_in_cache(path, &bytes, broadcast).await;
    }

    Ok(bytes.into())
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let fetch_error = |e: reqwest::Error| Error::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    };

    let response = http
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(fetch_error)?;
    let body = response.bytes().await.map_err(fetch_error)?;

    Ok(body.to_vec())
}

async fn store_in_cache(path: &Path, bytes: &[u8], broadcast: &NotificationBroadcast) {
    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent).await
    {
        broadcast.send_warning(format!("Unable to create cache directory: {e}"));
        return;
    }

    let tmp = path.with_extension("partial");
    if let Err(e) = fs::write(&tmp, bytes).await {
        broadcast.send_warning(format!("Unable to write cache temp file: {e}"));
    } else if let Err(e) = fs::rename(&tmp, path).await {
        _ = fs::remove_file(&tmp).await;
        broadcast.send_warning(format!("Unable to finalize cache file: {e}"));
    }
}

fn cache_path(cache_dir: &Path, url: &str) -> Option<PathBuf> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = sanitize_name(parsed.host_str().unwrap_or("unknown"));
    let file = sanitize_name(parsed.path().trim_start_matches('/'));

    Some(cache_dir.join(host).join(file))
}

/// Perceived loudness follows the cube of the amplitude.
fn set_volume(sink: &rodio::Sink, volume: f32) {
    sink.set_volume(volume.clamp(0.0, 1.0).powi(3));
}

const MAX_NAME_LEN: usize = 100;

/// Flatten a url component into one portable file name.
fn sanitize_name(input: &str) -> String {
    let mut name = String::with_capacity(input.len());

    for c in input.trim_matches([' ', '.']).chars() {
        let c = match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            c if c.is_control() => '_',
            c => c,
        };
        if c == '_' && name.ends_with('_') {
            continue;
        }
        name.push(c);
    }

    if name.is_empty() {
        return "unknown".to_string();
    }
    name.chars().take(MAX_NAME_LEN).collect()
}
