use crate::model::Episode;
use anyhow::{Context, Result};
use rodio::Source;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reports a device sends back to the transport controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    MetadataReady { duration_seconds: u32 },
    Tick { elapsed_seconds: u32 },
    Ended,
    UserPaused,
    UserResumed,
}

pub trait PlaybackDevice {
    /// Opens the episode's source, paused at zero. Queues `MetadataReady` on success.
    fn load(&mut self, episode: &Episode) -> Result<()>;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, seconds: u32) -> Result<()>;
    /// While looping, the device restarts the source itself and never reports `Ended`.
    fn set_loop(&mut self, looping: bool);
    fn tick(&mut self);
    fn poll_events(&mut self) -> Vec<DeviceEvent>;
    fn is_paused(&self) -> bool;
    fn is_looping(&self) -> bool;
    fn current_source(&self) -> Option<&str>;
    fn position(&self) -> Option<u32>;
    fn name(&self) -> &str;
}

impl<D: PlaybackDevice + ?Sized> PlaybackDevice for Box<D> {
    fn load(&mut self, episode: &Episode) -> Result<()> {
        (**self).load(episode)
    }

    fn play(&mut self) {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn seek(&mut self, seconds: u32) -> Result<()> {
        (**self).seek(seconds)
    }

    fn set_loop(&mut self, looping: bool) {
        (**self).set_loop(looping)
    }

    fn tick(&mut self) {
        (**self).tick()
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        (**self).poll_events()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }

    fn is_looping(&self) -> bool {
        (**self).is_looping()
    }

    fn current_source(&self) -> Option<&str> {
        (**self).current_source()
    }

    fn position(&self) -> Option<u32> {
        (**self).position()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

pub struct RodioDevice {
    stream: OutputStream,
    sink: Sink,
    slot: SourceSlot,
    looping: bool,
    pending: Vec<DeviceEvent>,
}

/// Bookkeeping for the source the sink holds.
#[derive(Debug, Default)]
struct SourceSlot {
    url: Option<String>,
    path: Option<PathBuf>,
    ended: bool,
    last_reported: Option<u32>,
}

impl SourceSlot {
    /// Forgets the previous source. A load that fails after this must not
    /// replay or end the old episode.
    fn begin_load(&mut self) {
        self.url = None;
        self.path = None;
        self.ended = true;
        self.last_reported = None;
    }

    fn loaded(&mut self, url: &str, path: PathBuf) {
        self.url = Some(url.to_string());
        self.path = Some(path);
        self.ended = false;
        self.last_reported = None;
    }

    fn release(&mut self) {
        *self = Self::default();
    }

    fn is_live(&self) -> bool {
        self.url.is_some() && !self.ended
    }

    fn restart_path(&self, looping: bool) -> Option<PathBuf> {
        if looping && self.is_live() {
            self.path.clone()
        } else {
            None
        }
    }

    /// Returns the elapsed second when it differs from the last one reported.
    fn report(&mut self, elapsed: u32) -> Option<u32> {
        if self.last_reported == Some(elapsed) {
            return None;
        }
        self.last_reported = Some(elapsed);
        Some(elapsed)
    }
}

impl RodioDevice {
    pub fn new() -> Result<Self> {
        let mut stream = with_silenced_stderr(|| {
            OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_stream_or_fallback()
                        .context("failed to start default output stream")
                })
        })?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());

        Ok(Self {
            stream,
            sink,
            slot: SourceSlot::default(),
            looping: false,
            pending: Vec::new(),
        })
    }

    fn open_source(&mut self, path: &Path) -> Result<Option<Duration>> {
        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();

        let file =
            File::open(path).with_context(|| format!("failed to open episode {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        let duration = source.total_duration();
        self.sink.append(source);
        Ok(duration)
    }
}

impl PlaybackDevice for RodioDevice {
    fn load(&mut self, episode: &Episode) -> Result<()> {
        self.slot.begin_load();
        let path = local_source_path(&episode.url)?;
        let decoded = self.open_source(&path)?;
        let duration_seconds = decoded
            .map(|duration| u32::try_from(duration.as_secs()).unwrap_or(u32::MAX))
            .unwrap_or(episode.duration);

        self.slot.loaded(&episode.url, path);
        self.pending
            .push(DeviceEvent::MetadataReady { duration_seconds });
        Ok(())
    }

    fn play(&mut self) {
        if self.slot.url.is_some() {
            self.sink.play();
        }
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.slot.release();
    }

    fn seek(&mut self, seconds: u32) -> Result<()> {
        if self.slot.url.is_none() {
            return Err(anyhow::anyhow!("no active episode"));
        }

        self.sink
            .try_seek(Duration::from_secs(u64::from(seconds)))
            .map_err(|err| anyhow::anyhow!("failed to seek current episode: {err:?}"))?;
        self.slot.last_reported = Some(seconds);
        Ok(())
    }

    fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn tick(&mut self) {
        if !self.slot.is_live() {
            return;
        }

        if self.sink.empty() {
            if let Some(path) = self.slot.restart_path(self.looping)
                && self.open_source(&path).is_ok()
            {
                self.sink.play();
                self.slot.last_reported = Some(0);
                self.pending.push(DeviceEvent::Tick { elapsed_seconds: 0 });
                return;
            }
            self.slot.ended = true;
            self.pending.push(DeviceEvent::Ended);
            return;
        }

        let elapsed = u32::try_from(self.sink.get_pos().as_secs()).unwrap_or(u32::MAX);
        if let Some(elapsed_seconds) = self.slot.report(elapsed) {
            self.pending.push(DeviceEvent::Tick { elapsed_seconds });
        }
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.pending)
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn current_source(&self) -> Option<&str> {
        self.slot.url.as_deref()
    }

    fn position(&self) -> Option<u32> {
        self.slot.url.as_ref()?;
        Some(u32::try_from(self.sink.get_pos().as_secs()).unwrap_or(u32::MAX))
    }

    fn name(&self) -> &str {
        "System default output (CPAL)"
    }
}

/// Simulated device with a one-second clock: every `tick` while playing
/// advances the position by one second.
#[derive(Debug, Default)]
pub struct NullDevice {
    current: Option<String>,
    duration_seconds: u32,
    position: u32,
    paused: bool,
    looping: bool,
    pending: Vec<DeviceEvent>,
}

impl NullDevice {
    pub fn new() -> Self {
        Self {
            paused: true,
            ..Self::default()
        }
    }

    /// Native media-key pause.
    pub fn user_pause(&mut self) {
        if self.current.is_some() && !self.paused {
            self.paused = true;
            self.pending.push(DeviceEvent::UserPaused);
        }
    }

    /// Native media-key resume.
    pub fn user_resume(&mut self) {
        if self.current.is_some() && self.paused {
            self.paused = false;
            self.pending.push(DeviceEvent::UserResumed);
        }
    }

    pub fn advance(&mut self, seconds: u32) {
        for _ in 0..seconds {
            self.tick();
        }
    }
}

impl PlaybackDevice for NullDevice {
    fn load(&mut self, episode: &Episode) -> Result<()> {
        self.current = Some(episode.url.clone());
        self.duration_seconds = episode.duration;
        self.position = 0;
        self.paused = true;
        self.pending.push(DeviceEvent::MetadataReady {
            duration_seconds: episode.duration,
        });
        Ok(())
    }

    fn play(&mut self) {
        if self.current.is_some() {
            self.paused = false;
        }
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn stop(&mut self) {
        self.current = None;
        self.duration_seconds = 0;
        self.position = 0;
        self.paused = true;
    }

    fn seek(&mut self, seconds: u32) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no active episode"));
        }
        self.position = seconds.min(self.duration_seconds);
        Ok(())
    }

    fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn tick(&mut self) {
        if self.current.is_none() || self.paused {
            return;
        }

        self.position = self.position.saturating_add(1);
        if self.position < self.duration_seconds {
            self.pending.push(DeviceEvent::Tick {
                elapsed_seconds: self.position,
            });
            return;
        }

        if self.looping {
            self.position = 0;
            self.pending.push(DeviceEvent::Tick { elapsed_seconds: 0 });
        } else {
            self.position = self.duration_seconds;
            self.paused = true;
            self.pending.push(DeviceEvent::Ended);
        }
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.pending)
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn current_source(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn position(&self) -> Option<u32> {
        self.current.as_ref()?;
        Some(self.position)
    }

    fn name(&self) -> &str {
        "Null playback device"
    }
}

fn local_source_path(url: &str) -> Result<PathBuf> {
    if url.starts_with("http://") || url.starts_with("https://") {
        anyhow::bail!("remote source {url} cannot be opened by the local output");
    }
    Ok(PathBuf::from(url.strip_prefix("file://").unwrap_or(url)))
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}
