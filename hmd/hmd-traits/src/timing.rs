use log::trace;
use std::time::{Duration, Instant};

/// One predicted display refresh interval. All times are seconds on the
/// clock that produced the token.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTiming {
    pub frame_index: u64,
    /// Time since the previous frame began, zero for the first frame
    pub delta_seconds: f32,
    pub this_frame_seconds: f64,
    /// Midpoint of the predicted scan-out, the time a pose should be sampled for
    pub scanout_midpoint_seconds: f64,
    pub next_frame_seconds: f64,
}

/// Monotonic clock handing out [`FrameTiming`] tokens at a nominal refresh rate.
#[derive(Debug)]
pub struct FrameClock {
    epoch: Instant,
    frame_interval: Duration,
    last_frame_seconds: Option<f64>,
    in_frame: bool,
}

impl FrameClock {
    pub fn new(refresh_rate_hz: f32) -> Self {
        let hz = if refresh_rate_hz > 0.0 { refresh_rate_hz } else { 60.0 };
        FrameClock {
            epoch: Instant::now(),
            frame_interval: Duration::from_secs_f64(1.0 / hz as f64),
            last_frame_seconds: None,
            in_frame: false,
        }
    }

    pub fn now_seconds(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Converts an instant to seconds on this clock; instants before the epoch map to zero.
    pub fn seconds_at(&self, instant: Instant) -> f64 {
        instant.saturating_duration_since(self.epoch).as_secs_f64()
    }

    /// Starts a frame. Beginning again before [`FrameClock::end`] replaces the open frame.
    pub fn begin(&mut self, frame_index: u64) -> FrameTiming {
        if self.in_frame {
            trace!("Frame {} begun without ending the previous one", frame_index);
        }
        let now = self.now_seconds();
        let interval = self.frame_interval.as_secs_f64();
        let delta = self.last_frame_seconds.map(|last| now - last).unwrap_or(0.0);
        self.last_frame_seconds = Some(now);
        self.in_frame = true;

        FrameTiming {
            frame_index,
            delta_seconds: delta as f32,
            this_frame_seconds: now,
            scanout_midpoint_seconds: now + interval * 0.5,
            next_frame_seconds: now + interval,
        }
    }

    pub fn end(&mut self) {
        self.in_frame = false;
    }
}
