//! A tracking runtime that needs no hardware.

use hmd_traits::{
    FrameClock, FrameTiming, HmdDescription, HmdDevice, HmdError, Pose, PoseState, Quaternion,
    StatusFlags, TrackingCaps, TrackingRuntime, TrackingState, Vector3,
};
use std::cell::Cell;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

const REFRESH_RATE_HZ: f32 = 75.0;

/// Counts every runtime and device call so lifecycle rules can be checked.
#[derive(Debug, Default)]
pub struct LifecycleCounters {
    initialize: AtomicUsize,
    create: AtomicUsize,
    configure: AtomicUsize,
    begin_frame: AtomicUsize,
    end_frame: AtomicUsize,
    destroy: AtomicUsize,
    shutdown: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub initialize: usize,
    pub create: usize,
    pub configure: usize,
    pub begin_frame: usize,
    pub end_frame: usize,
    pub destroy: usize,
    pub shutdown: usize,
}

impl LifecycleCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            initialize: self.initialize.load(Ordering::Relaxed),
            create: self.create.load(Ordering::Relaxed),
            configure: self.configure.load(Ordering::Relaxed),
            begin_frame: self.begin_frame.load(Ordering::Relaxed),
            end_frame: self.end_frame.load(Ordering::Relaxed),
            destroy: self.destroy.load(Ordering::Relaxed),
            shutdown: self.shutdown.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
enum Motion {
    /// Slow sine waves on all three axes.
    Sweeping,
    /// Played back in order; the last state repeats.
    Scripted(Vec<TrackingState>),
}

pub struct SimulatedRuntime {
    motion: Option<Motion>,
    fail_initialize: bool,
    fail_configuration: bool,
    counters: Arc<LifecycleCounters>,
}

impl SimulatedRuntime {
    fn with_motion(motion: Option<Motion>) -> Self {
        SimulatedRuntime {
            motion,
            fail_initialize: false,
            fail_configuration: false,
            counters: Arc::new(LifecycleCounters::default()),
        }
    }

    pub fn sweeping() -> Self {
        Self::with_motion(Some(Motion::Sweeping))
    }

    pub fn scripted(states: Vec<TrackingState>) -> Self {
        Self::with_motion(Some(Motion::Scripted(states)))
    }

    pub fn without_device() -> Self {
        Self::with_motion(None)
    }

    pub fn failing() -> Self {
        SimulatedRuntime { fail_initialize: true, ..Self::without_device() }
    }

    pub fn with_failing_configuration(mut self) -> Self {
        self.fail_configuration = true;
        self
    }

    pub fn counters(&self) -> Arc<LifecycleCounters> {
        Arc::clone(&self.counters)
    }
}

impl TrackingRuntime for SimulatedRuntime {
    type Device = SimulatedHmd;

    fn initialize(&mut self) -> Result<(), HmdError> {
        if self.fail_initialize {
            return Err(HmdError::RuntimeError("simulated runtime failed to start".to_string()));
        }
        LifecycleCounters::bump(&self.counters.initialize);
        Ok(())
    }

    fn create_device(&mut self, index: usize) -> Result<Option<SimulatedHmd>, HmdError> {
        let Some(motion) = self.motion.clone().filter(|_| index == 0) else {
            return Ok(None);
        };
        LifecycleCounters::bump(&self.counters.create);
        Ok(Some(SimulatedHmd {
            motion,
            cursor: Cell::new(0),
            clock: FrameClock::new(REFRESH_RATE_HZ),
            fail_configuration: self.fail_configuration,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn destroy_device(&mut self, _device: SimulatedHmd) {
        LifecycleCounters::bump(&self.counters.destroy);
    }

    fn shutdown(&mut self) {
        LifecycleCounters::bump(&self.counters.shutdown);
    }
}

pub struct SimulatedHmd {
    motion: Motion,
    cursor: Cell<usize>,
    clock: FrameClock,
    fail_configuration: bool,
    counters: Arc<LifecycleCounters>,
}

/// Yaw, pitch and roll (radians) of the sweeping motion at time `t`.
pub fn sweep_angles(t: f64) -> (f32, f32, f32) {
    let wave = |amplitude_deg: f64, period_s: f64| {
        (amplitude_deg.to_radians() * (TAU * t / period_s).sin()) as f32
    };
    (wave(60.0, 10.0), wave(20.0, 4.3), wave(10.0, 2.7))
}

fn sweep_state(t: f64) -> TrackingState {
    let (yaw, pitch, roll) = sweep_angles(t);
    let orientation = Quaternion::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), yaw)
        * Quaternion::from_axis_angle(Vector3::new(1.0, 0.0, 0.0), pitch)
        * Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), roll);

    TrackingState {
        head_pose: PoseState {
            pose: Pose { orientation, position: Vector3::default() },
            time_in_seconds: t,
            ..PoseState::default()
        },
        status_flags: StatusFlags::ORIENTATION_TRACKED | StatusFlags::HMD_CONNECTED,
    }
}

impl HmdDevice for SimulatedHmd {
    fn description(&self) -> HmdDescription {
        HmdDescription {
            product_name: "Simulated HMD".to_string(),
            manufacturer: "hmd".to_string(),
            serial_number: "SIM0000".to_string(),
            refresh_rate_hz: REFRESH_RATE_HZ,
        }
    }

    fn configure_tracking(
        &mut self,
        supported: TrackingCaps,
        required: TrackingCaps,
    ) -> Result<(), HmdError> {
        if self.fail_configuration {
            return Err(HmdError::ConfigurationError("simulated configuration failure".to_string()));
        }
        LifecycleCounters::bump(&self.counters.configure);
        debug!("Simulated tracking configured: supported={:?} required={:?}", supported, required);
        Ok(())
    }

    fn begin_frame_timing(&mut self, frame_index: u64) -> FrameTiming {
        LifecycleCounters::bump(&self.counters.begin_frame);
        self.clock.begin(frame_index)
    }

    fn tracking_state(&self, abs_time_seconds: f64) -> Result<TrackingState, HmdError> {
        match &self.motion {
            Motion::Sweeping => Ok(sweep_state(abs_time_seconds)),
            Motion::Scripted(states) => {
                let index = self.cursor.get();
                self.cursor.set(index + 1);
                let state = states
                    .get(index)
                    .or_else(|| states.last())
                    .copied()
                    .unwrap_or_default();
                Ok(state)
            }
        }
    }

    fn end_frame_timing(&mut self) {
        LifecycleCounters::bump(&self.counters.end_frame);
        self.clock.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sweep_matches_its_angles() {
        for t in [0.0, 0.5, 1.7, 3.3] {
            let (yaw, pitch, roll) = sweep_angles(t);
            let (y, p, r) = sweep_state(t).head_pose.pose.orientation.yaw_pitch_roll();
            assert_relative_eq!(y, yaw, epsilon = 1e-5);
            assert_relative_eq!(p, pitch, epsilon = 1e-5);
            assert_relative_eq!(r, roll, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_script_repeats_last_state() {
        let tracked = TrackingState::tracked(Quaternion::identity());
        let mut runtime = SimulatedRuntime::scripted(vec![TrackingState::untracked(), tracked]);
        runtime.initialize().unwrap();
        let device = runtime.create_device(0).unwrap().unwrap();

        assert!(!device.tracking_state(0.0).unwrap().status_flags.is_tracked());
        assert!(device.tracking_state(0.0).unwrap().status_flags.is_tracked());
        assert!(device.tracking_state(0.0).unwrap().status_flags.is_tracked());
    }

    #[test]
    fn test_empty_script_is_untracked() {
        let mut runtime = SimulatedRuntime::scripted(Vec::new());
        let device = runtime.create_device(0).unwrap().unwrap();
        assert_eq!(device.tracking_state(1.0).unwrap(), TrackingState::untracked());
    }

    #[test]
    fn test_only_index_zero_exists() {
        let mut runtime = SimulatedRuntime::sweeping();
        assert!(runtime.create_device(1).unwrap().is_none());
        assert!(runtime.create_device(0).unwrap().is_some());
        assert_eq!(runtime.counters().snapshot().create, 1);
    }

    #[test]
    fn test_frame_timing_is_counted() {
        let mut runtime = SimulatedRuntime::sweeping();
        let counters = runtime.counters();
        let mut device = runtime.create_device(0).unwrap().unwrap();

        let timing = device.begin_frame_timing(7);
        assert_eq!(timing.frame_index, 7);
        device.end_frame_timing();

        let calls = counters.snapshot();
        assert_eq!((calls.begin_frame, calls.end_frame), (1, 1));
        assert_eq!(device.description().refresh_rate_hz, REFRESH_RATE_HZ);
    }
}
