use std::time::{Duration, Instant};

use crate::core::CancelToken;

/// Paces frame publication to the source frame rate.
///
/// Each loop iteration records its start instant, decodes and publishes a
/// frame, then calls pace(): if the iteration finished early the clock waits
/// out the remainder of the frame delay. The wait rides the session's cancel
/// token so pause() interrupts it immediately. A slow decoder overruns its
/// slot and the next frame simply starts late; there is no frame dropping or
/// catch-up.
pub struct PlaybackClock {
    frame_delay: Duration,
    cancel: CancelToken,
}

impl PlaybackClock {
    pub fn new(frame_delay: Duration, cancel: CancelToken) -> Self {
        Self { frame_delay, cancel }
    }

    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    /// Wait out the rest of the iteration's pacing slot.
    /// Returns false if playback was cancelled during (or before) the wait.
    pub fn pace(&self, iteration_started: Instant) -> bool {
        let elapsed = iteration_started.elapsed();
        if elapsed >= self.frame_delay {
            return !self.cancel.is_cancelled();
        }
        !self.cancel.wait_timeout(self.frame_delay - elapsed)
    }
}
