use crate::console::{ExitSignal, OrientationDisplay};
use crate::data::OrientationSample;
use hmd_traits::{FrameTiming, HmdDevice, HmdError};
use std::thread;
use std::time::Duration;
use tracing::trace;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay after every sample, tracked or not
    pub interval: Duration,
    /// Stop after this many frames; run until an exit request otherwise
    pub max_frames: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig { interval: DEFAULT_INTERVAL, max_frames: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    ExitRequested,
    FrameLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub outcome: PollOutcome,
    pub frames: u64,
    pub rendered: u64,
    pub untracked: u64,
}

/// Samples the head pose once per frame and renders it until asked to stop.
pub struct OrientationPoller<'a, D: HmdDevice, O: OrientationDisplay, K: ExitSignal> {
    device: &'a mut D,
    display: O,
    exit: K,
    config: PollerConfig,
}

impl<'a, D: HmdDevice, O: OrientationDisplay, K: ExitSignal> OrientationPoller<'a, D, O, K> {
    pub fn new(device: &'a mut D, display: O, exit: K, config: PollerConfig) -> Self {
        OrientationPoller { device, display, exit, config }
    }

    #[cfg(test)]
    fn display(&self) -> &O {
        &self.display
    }

    pub fn run(&mut self) -> Result<PollReport, HmdError> {
        let mut report = PollReport {
            outcome: PollOutcome::FrameLimit,
            frames: 0,
            rendered: 0,
            untracked: 0,
        };
        if self.config.max_frames == Some(0) {
            return Ok(report);
        }

        loop {
            let timing = self.device.begin_frame_timing(report.frames);
            let sampled = self.sample(&timing);
            if sampled.is_ok() {
                thread::sleep(self.config.interval);
            }
            self.device.end_frame_timing();

            if sampled? {
                report.rendered += 1;
            } else {
                report.untracked += 1;
            }
            report.frames += 1;

            if self.exit.exit_requested()? {
                report.outcome = PollOutcome::ExitRequested;
                return Ok(report);
            }
            if self.config.max_frames.is_some_and(|max| report.frames >= max) {
                return Ok(report);
            }
        }
    }

    /// Renders the pose at the frame's scan-out midpoint. Returns whether it was tracked.
    fn sample(&mut self, timing: &FrameTiming) -> Result<bool, HmdError> {
        let state = self.device.tracking_state(timing.scanout_midpoint_seconds)?;
        if !state.status_flags.is_tracked() {
            trace!("Frame {} untracked ({:?})", timing.frame_index, state.status_flags);
            return Ok(false);
        }

        let sample = OrientationSample::from_rotation(state.head_pose.pose.orientation);
        trace!("Frame {}: {}", timing.frame_index, sample);
        self.display.render(&sample)?;
        Ok(true)
    }
}
