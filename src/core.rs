use crate::error::{Result, TransportError};
use crate::model::{Episode, TransportState};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::IteratorRandom;
use tracing::debug;

/// Queue, selection and transport flags for one playback session.
///
/// Every operation is total: out-of-range input is clamped and commands that
/// need a current item do nothing while the queue is empty.
#[derive(Debug)]
pub struct TransportController {
    queue: Vec<Episode>,
    current_index: usize,
    is_playing: bool,
    is_looping: bool,
    is_shuffling: bool,
    progress_seconds: u32,
    selection: u64,
    shuffle_rng: SmallRng,
}

impl TransportController {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(shuffle_rng: SmallRng) -> Self {
        Self {
            queue: Vec::new(),
            current_index: 0,
            is_playing: false,
            is_looping: false,
            is_shuffling: false,
            progress_seconds: 0,
            selection: 0,
            shuffle_rng,
        }
    }

    pub fn load_single(&mut self, episode: Episode) {
        debug!(title = %episode.title, "loading single episode");
        self.queue = vec![episode];
        self.select(0);
        self.is_playing = true;
    }

    /// Replaces the queue; a start index past the end selects the last item.
    pub fn load_queue(&mut self, episodes: Vec<Episode>, start_index: usize) {
        self.queue = episodes;
        if self.queue.is_empty() {
            debug!("loaded empty queue");
            self.select(0);
            self.is_playing = false;
            return;
        }

        let last = self.queue.len() - 1;
        if start_index > last {
            debug!(start_index, clamped = last, "start index clamped");
        }
        self.select(start_index.min(last));
        self.is_playing = true;
        debug!(
            len = self.queue.len(),
            index = self.current_index,
            "loaded queue"
        );
    }

    pub fn try_load_queue(&mut self, episodes: Vec<Episode>, start_index: usize) -> Result<()> {
        if !episodes.is_empty() && start_index >= episodes.len() {
            return Err(TransportError::IndexOutOfBounds {
                index: start_index,
                len: episodes.len(),
            });
        }
        self.load_queue(episodes, start_index);
        Ok(())
    }

    pub fn toggle_pause(&mut self) {
        if self.queue.is_empty() {
            self.is_playing = false;
            return;
        }
        self.is_playing = !self.is_playing;
        debug!(playing = self.is_playing, "toggled pause");
    }

    pub fn toggle_loop(&mut self) {
        self.is_looping = !self.is_looping;
        debug!(looping = self.is_looping, "toggled loop");
    }

    /// Only changes how `next` picks; the queue order is left alone.
    pub fn toggle_shuffle(&mut self) {
        self.is_shuffling = !self.is_shuffling;
        debug!(shuffling = self.is_shuffling, "toggled shuffle");
    }

    pub fn report_playing(&mut self, playing: bool) {
        self.is_playing = playing && !self.queue.is_empty();
    }

    /// Drops the queue and selection. Loop and shuffle stay as they were.
    pub fn clear(&mut self) {
        debug!("clearing queue");
        self.queue.clear();
        self.select(0);
        self.is_playing = false;
    }

    pub fn next(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        if self.is_shuffling {
            // Uniform pick; the current index may come up again.
            if let Some(index) = (0..self.queue.len()).choose(&mut self.shuffle_rng) {
                debug!(index, "shuffle picked");
                self.select(index);
            }
        } else if self.has_next() {
            self.select(self.current_index + 1);
        }
    }

    pub fn previous(&mut self) {
        if self.has_previous() {
            self.select(self.current_index - 1);
        }
    }

    pub fn on_playback_ended(&mut self) {
        if self.has_next() {
            self.next();
        } else {
            debug!("queue exhausted");
            self.clear();
        }
    }

    /// Moves the cached position, bounded by the current item's duration.
    /// Returns the applied position, or `None` when nothing is selected.
    pub fn seek(&mut self, seconds: u32) -> Option<u32> {
        let duration = self.current_item()?.duration;
        self.progress_seconds = seconds.min(duration);
        Some(self.progress_seconds)
    }

    pub fn report_progress(&mut self, elapsed_seconds: u32) {
        if self.queue.is_empty() {
            return;
        }
        self.progress_seconds = elapsed_seconds;
    }

    pub fn reset_progress(&mut self) {
        self.progress_seconds = 0;
    }

    pub fn current_item(&self) -> Option<&Episode> {
        self.queue.get(self.current_index)
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.queue.is_empty()).then_some(self.current_index)
    }

    pub fn current_duration(&self) -> u32 {
        self.current_item().map_or(0, |episode| episode.duration)
    }

    pub fn queue(&self) -> &[Episode] {
        &self.queue
    }

    pub fn has_next(&self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        self.is_shuffling || self.current_index + 1 < self.queue.len()
    }

    pub fn has_previous(&self) -> bool {
        !self.queue.is_empty() && self.current_index > 0
    }

    pub fn can_control(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Shuffling a lone item changes nothing, so the control is gated on two or more.
    pub fn can_toggle_shuffle(&self) -> bool {
        self.queue.len() > 1
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    pub fn is_shuffling(&self) -> bool {
        self.is_shuffling
    }

    pub fn progress_seconds(&self) -> u32 {
        self.progress_seconds
    }

    /// Bumped on every selection, including a shuffle landing on the same index.
    pub fn selection(&self) -> u64 {
        self.selection
    }

    pub fn state(&self) -> TransportState {
        match (self.queue.is_empty(), self.is_playing) {
            (true, _) => TransportState::Empty,
            (false, true) => TransportState::Playing,
            (false, false) => TransportState::Paused,
        }
    }

    fn select(&mut self, index: usize) {
        self.current_index = index;
        self.progress_seconds = 0;
        self.selection = self.selection.wrapping_add(1);
    }
}

impl Default for TransportController {
    fn default() -> Self {
        Self::new()
    }
}
