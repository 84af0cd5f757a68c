use crate::audio::{DeviceEvent, PlaybackDevice};
use crate::core::TransportController;
use crate::error::Result;
use crate::model::{Episode, PlayerConfig, StartIndexPolicy};
use tracing::{debug, info, warn};

/// One controller wired to one playback device.
///
/// Every command updates the controller first and then brings the device in
/// line with the new state; device reports flow back through
/// [`Session::handle_device_event`].
pub struct Session<D: PlaybackDevice = Box<dyn PlaybackDevice>> {
    core: TransportController,
    device: D,
    config: PlayerConfig,
    pub status: String,
    loaded_selection: Option<u64>,
    applied_playing: Option<bool>,
}

impl<D: PlaybackDevice> Session<D> {
    pub fn new(device: D, config: PlayerConfig) -> Self {
        Self::with_controller(TransportController::new(), device, config)
    }

    pub fn with_controller(mut core: TransportController, device: D, config: PlayerConfig) -> Self {
        if config.start_looping != core.is_looping() {
            core.toggle_loop();
        }
        if config.start_shuffling != core.is_shuffling() {
            core.toggle_shuffle();
        }
        info!(device = device.name(), "session started");

        let mut session = Self {
            core,
            device,
            config,
            status: String::from("Ready"),
            loaded_selection: None,
            applied_playing: None,
        };
        session.sync_device();
        session
    }

    pub fn controller(&self) -> &TransportController {
        &self.core
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn play_episode(&mut self, episode: Episode) {
        self.set_status(&format!("Playing {}", episode.title));
        self.core.load_single(episode);
        self.sync_device();
    }

    /// Loads a list, treating a bad start index according to the configured policy.
    pub fn play_list(&mut self, episodes: Vec<Episode>, start_index: usize) -> Result<()> {
        let len = episodes.len();
        match self.config.start_index_policy {
            StartIndexPolicy::Clamp => self.core.load_queue(episodes, start_index),
            StartIndexPolicy::Reject => {
                if let Err(err) = self.core.try_load_queue(episodes, start_index) {
                    self.set_status(&format!("{err}"));
                    return Err(err);
                }
            }
        }
        self.set_status(&format!("Loaded {len} episodes"));
        self.sync_device();
        Ok(())
    }

    pub fn toggle_pause(&mut self) {
        self.core.toggle_pause();
        self.set_status(if self.core.is_playing() {
            "Resumed"
        } else {
            "Paused"
        });
        self.sync_device();
    }

    pub fn toggle_loop(&mut self) {
        self.core.toggle_loop();
        self.set_status(&format!("Loop: {}", on_off(self.core.is_looping())));
        self.sync_device();
    }

    pub fn toggle_shuffle(&mut self) {
        self.core.toggle_shuffle();
        self.set_status(&format!("Shuffle: {}", on_off(self.core.is_shuffling())));
        self.sync_device();
    }

    pub fn next(&mut self) {
        if !self.core.has_next() {
            self.set_status("No next episode");
            return;
        }
        self.core.next();
        self.sync_device();
    }

    pub fn previous(&mut self) {
        if !self.core.has_previous() {
            self.set_status("No previous episode");
            return;
        }
        self.core.previous();
        self.sync_device();
    }

    pub fn clear(&mut self) {
        self.core.clear();
        self.set_status("Queue cleared");
        self.sync_device();
    }

    pub fn seek(&mut self, seconds: u32) {
        let Some(position) = self.core.seek(seconds) else {
            self.set_status("Nothing to seek");
            return;
        };
        if let Err(err) = self.device.seek(position) {
            self.report_device_error("seek", &err);
        }
    }

    pub fn scrub_forward(&mut self) {
        let step = u32::from(self.config.scrub_seconds);
        self.seek(self.core.progress_seconds().saturating_add(step));
    }

    pub fn scrub_backward(&mut self) {
        let step = u32::from(self.config.scrub_seconds);
        self.seek(self.core.progress_seconds().saturating_sub(step));
    }

    /// Applies pending device reports, advances the device clock, then applies
    /// whatever the tick produced.
    pub fn pump(&mut self) {
        self.drain_device_events();
        self.device.tick();
        self.drain_device_events();
    }

    fn drain_device_events(&mut self) {
        for event in self.device.poll_events() {
            self.handle_device_event(event);
        }
    }

    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::MetadataReady { duration_seconds } => {
                debug!(duration_seconds, "metadata ready");
                self.core.reset_progress();
                if let Err(err) = self.device.seek(0) {
                    self.report_device_error("seek", &err);
                }
            }
            DeviceEvent::Tick { elapsed_seconds } => self.core.report_progress(elapsed_seconds),
            DeviceEvent::Ended => {
                self.core.on_playback_ended();
                if self.core.current_item().is_none() {
                    self.set_status("Reached end of queue");
                }
                self.sync_device();
            }
            DeviceEvent::UserPaused | DeviceEvent::UserResumed => {
                let playing = event == DeviceEvent::UserResumed;
                self.core.report_playing(playing);
                // The device already did it; only record the new state.
                self.applied_playing = Some(self.core.is_playing());
                self.sync_device();
            }
        }
    }

    pub fn describe(&self) -> String {
        let mut flags = Vec::new();
        if self.core.is_looping() {
            flags.push("loop");
        }
        if self.core.is_shuffling() {
            flags.push("shuffle");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };

        match (self.core.current_item(), self.core.current_index()) {
            (Some(episode), Some(index)) => format!(
                "[{}] {}/{} {} - {} {}s/{}s{flags}",
                self.core.state().label(),
                index + 1,
                self.core.queue().len(),
                episode.title,
                episode.members,
                self.core.progress_seconds(),
                self.core.current_duration(),
            ),
            _ => format!("[{}]{flags}", self.core.state().label()),
        }
    }

    fn sync_device(&mut self) {
        let selection = self
            .core
            .current_item()
            .map(|_| self.core.selection());
        if selection != self.loaded_selection {
            let loaded = match self.core.current_item() {
                Some(episode) => {
                    debug!(url = %episode.url, "loading source");
                    self.device.load(episode)
                }
                None => {
                    self.device.stop();
                    Ok(())
                }
            };
            self.loaded_selection = selection;
            self.applied_playing = None;
            match loaded {
                // Apply the load's metadata now so it cannot rewind a later seek.
                Ok(()) => self.drain_device_events(),
                Err(err) => self.report_device_error("load", &err),
            }
        }

        if self.device.is_looping() != self.core.is_looping() {
            self.device.set_loop(self.core.is_looping());
        }

        let playing = self.core.is_playing();
        if self.applied_playing != Some(playing) {
            if playing {
                self.device.play();
            } else {
                self.device.pause();
            }
            self.applied_playing = Some(playing);
        }
    }

    fn report_device_error(&mut self, action: &str, err: &anyhow::Error) {
        warn!(action, error = %format!("{err:#}"), "playback device error");
        self.set_status(&format!("playback error: {err:#}"));
    }

    fn set_status(&mut self, message: &str) {
        self.status = message.to_string();
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullDevice;
    use crate::error::TransportError;

    fn episode(title: &str, duration: u32) -> Episode {
        Episode {
            title: title.to_string(),
            thumbnail: String::new(),
            members: String::from("crew"),
            published_at: String::new(),
            duration,
            url: format!("{title}.mp3"),
        }
    }

    fn session() -> Session<NullDevice> {
        Session::with_controller(
            TransportController::with_seed(5),
            NullDevice::new(),
            PlayerConfig::default(),
        )
    }

    #[test]
    fn loading_starts_the_device() {
        let mut session = session();
        session.play_episode(episode("a", 10));

        assert_eq!(session.device().current_source(), Some("a.mp3"));
        assert!(!session.device().is_paused());
    }

    #[test]
    fn pause_toggle_reaches_the_device() {
        let mut session = session();
        session.play_episode(episode("a", 10));
        session.toggle_pause();
        assert!(session.device().is_paused());

        session.toggle_pause();
        assert!(!session.device().is_paused());
    }

    #[test]
    fn loop_flag_reaches_the_device() {
        let mut session = session();
        session.toggle_loop();
        assert!(session.device().is_looping());
    }

    #[test]
    fn metadata_resets_progress() {
        let mut session = session();
        session.play_episode(episode("a", 10));
        session.pump();
        session.pump();
        assert_eq!(session.controller().progress_seconds(), 2);

        session.handle_device_event(DeviceEvent::MetadataReady {
            duration_seconds: 10,
        });
        assert_eq!(session.controller().progress_seconds(), 0);
        assert_eq!(session.device().position(), Some(0));
    }

    #[test]
    fn seek_right_after_load_survives_the_next_pump() {
        let mut session = session();
        session.play_episode(episode("a", 100));
        session.seek(42);
        session.pump();

        assert!(session.controller().progress_seconds() >= 42);
        assert!(session.device().position() >= Some(42));
    }

    #[test]
    fn scrub_after_list_load_is_kept() {
        let mut session = session();
        session
            .play_list(vec![episode("a", 100), episode("b", 100)], 1)
            .expect("load");
        session.scrub_forward();
        session.pump();

        assert_eq!(session.controller().progress_seconds(), 16);
    }

    #[test]
    fn ended_advances_to_next_source() {
        let mut session = session();
        session
            .play_list(vec![episode("a", 2), episode("b", 2)], 0)
            .expect("load");
        session.pump();
        session.pump();

        assert_eq!(session.controller().current_index(), Some(1));
        assert_eq!(session.device().current_source(), Some("b.mp3"));
        assert!(!session.device().is_paused());
    }

    #[test]
    fn ended_at_last_episode_stops_the_device() {
        let mut session = session();
        session.play_episode(episode("a", 1));
        session.pump();

        assert!(session.controller().current_item().is_none());
        assert_eq!(session.device().current_source(), None);
        assert_eq!(session.status, "Reached end of queue");
    }

    #[test]
    fn looping_device_never_ends() {
        let mut session = session();
        session.toggle_loop();
        session.play_episode(episode("a", 2));
        for _ in 0..6 {
            session.pump();
        }

        assert_eq!(
            session.controller().current_item().map(|e| e.title.as_str()),
            Some("a")
        );
    }

    #[test]
    fn native_pause_updates_the_controller() {
        let mut session = session();
        session.play_episode(episode("a", 10));
        session.device_mut().user_pause();
        session.pump();
        assert!(!session.controller().is_playing());

        session.device_mut().user_resume();
        session.pump();
        assert!(session.controller().is_playing());
    }

    #[test]
    fn scrub_moves_by_configured_step() {
        let mut session = session();
        session.play_episode(episode("a", 100));
        session.scrub_forward();
        assert_eq!(session.controller().progress_seconds(), 15);
        assert_eq!(session.device().position(), Some(15));

        session.scrub_backward();
        session.scrub_backward();
        assert_eq!(session.controller().progress_seconds(), 0);
    }

    #[test]
    fn reject_policy_surfaces_bad_start_index() {
        let config = PlayerConfig {
            start_index_policy: StartIndexPolicy::Reject,
            ..PlayerConfig::default()
        };
        let mut session =
            Session::with_controller(TransportController::with_seed(1), NullDevice::new(), config);

        let err = session
            .play_list(vec![episode("a", 5)], 3)
            .expect_err("rejected");
        assert_eq!(err, TransportError::IndexOutOfBounds { index: 3, len: 1 });
        assert_eq!(session.device().current_source(), None);
    }

    #[test]
    fn configured_flags_apply_at_start() {
        let config = PlayerConfig {
            start_looping: true,
            start_shuffling: true,
            ..PlayerConfig::default()
        };
        let session =
            Session::with_controller(TransportController::with_seed(1), NullDevice::new(), config);

        assert!(session.controller().is_looping());
        assert!(session.controller().is_shuffling());
        assert!(session.device().is_looping());
    }

    #[test]
    fn describe_reports_selection() {
        let mut session = session();
        assert_eq!(session.describe(), "[empty]");

        session
            .play_list(vec![episode("a", 60), episode("b", 30)], 1)
            .expect("load");
        session.toggle_loop();
        assert_eq!(session.describe(), "[playing] 2/2 b - crew 0s/30s (loop)");
    }
}
