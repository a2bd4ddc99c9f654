use std::thread::sleep;
use std::time::{Duration, Instant};

/// Emulates a hardware device's clock for a push-only transport.
///
/// Deadlines are computed from the frame count since the clock was armed
/// rather than accumulated per buffer, so they never drift from the
/// nominal rate.
#[derive(Debug, Default)]
pub struct PacingClock {
    origin: Option<Instant>,
    frames_since_origin: u64,
    frames_written: u64,
}

impl PacingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the deadline; the next transfer starts counting from "now".
    /// The written frame count is kept.
    pub fn rearm(&mut self) {
        self.origin = None;
        self.frames_since_origin = 0;
    }

    /// Account for `frames` about to go out at `rate` and return the
    /// instant the transfer should complete.
    pub fn advance(&mut self, frames: u64, rate: u32, now: Instant) -> Instant {
        let origin = *self.origin.get_or_insert(now);
        self.frames_since_origin += frames;
        origin + frames_to_duration(self.frames_since_origin, rate)
    }

    pub fn commit(&mut self, frames: u64) {
        self.frames_written += frames;
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Position inside a virtual ring buffer of `buffer_size` frames.
    pub fn pointer(&self, buffer_size: u64) -> u64 {
        if buffer_size == 0 {
            0
        } else {
            self.frames_written % buffer_size
        }
    }
}

pub fn frames_to_duration(frames: u64, rate: u32) -> Duration {
    let rate = rate.max(1) as u128;
    let nanos = frames as u128 * 1_000_000_000 / rate;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Block until `deadline`. Returns immediately if it already passed.
pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        sleep(deadline - now);
    }
}
