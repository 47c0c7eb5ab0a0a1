use std::time::Duration;

/// Default delay between frames during playback.
pub const DEFAULT_PLAYBACK_INTERVAL: Duration = Duration::from_millis(320);

/// Timeline position and play/pause state for one loaded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    step: usize,
    max_step: usize,
    playing: bool,
}

impl Playback {
    /// Paused at step 0 of a run with `event_count` events.
    pub fn new(event_count: usize) -> Self {
        Self {
            step: 0,
            max_step: event_count.saturating_sub(1),
            playing: false,
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn max_step(&self) -> usize {
        self.max_step
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn at_end(&self) -> bool {
        self.step >= self.max_step
    }

    /// Jump to `step` (clamped). Manual scrubbing always pauses.
    pub fn scrub(&mut self, step: usize) -> usize {
        self.playing = false;
        self.step = step.min(self.max_step);
        self.step
    }

    /// Start or pause. Runs with a single step cannot play.
    pub fn toggle(&mut self) -> bool {
        if self.max_step == 0 {
            return false;
        }
        self.playing = !self.playing;
        self.playing
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Advance one frame while playing; pauses on reaching the last step.
    ///
    /// Returns the new step, or `None` when not playing.
    pub fn tick(&mut self) -> Option<usize> {
        if !self.playing {
            return None;
        }
        self.step = (self.step + 1).min(self.max_step);
        if self.at_end() {
            self.playing = false;
        }
        Some(self.step)
    }

    /// `Step n / max` label for the timeline.
    pub fn label(&self) -> String {
        format!("Step {} / {}", self.step, self.max_step)
    }
}
