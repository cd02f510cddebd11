pub mod math;
pub mod timing;

use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

pub use math::{Axis, Quaternion, Vector3};
pub use timing::{FrameClock, FrameTiming};

// --- Pose Types ---
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    /// Head orientation as a unit quaternion (WXYZ order)
    pub orientation: Quaternion,
    /// Head position (m), zero when position is not tracked
    pub position: Vector3,
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pose(orientation={}, position={})", self.orientation, self.position)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoseState {
    pub pose: Pose,
    /// Angular velocity (rad/s)
    pub angular_velocity: Vector3,
    /// Acceleration without gravity, world frame (m/s²)
    pub linear_acceleration: Vector3,
    /// Absolute time the pose was sampled at (s)
    pub time_in_seconds: f64,
}

bitflags! {
    /// Tracking status reported alongside every head pose.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct StatusFlags: u32 {
        const ORIENTATION_TRACKED = 0x0001;
        const POSITION_TRACKED = 0x0002;
        const CAMERA_POSE_TRACKED = 0x0004;
        const POSITION_CONNECTED = 0x0020;
        const HMD_CONNECTED = 0x0080;
    }
}

impl StatusFlags {
    /// True when the head pose carries a usable orientation or position.
    pub fn is_tracked(&self) -> bool {
        self.intersects(StatusFlags::ORIENTATION_TRACKED | StatusFlags::POSITION_TRACKED)
    }
}

bitflags! {
    /// Tracking capabilities a runtime can be asked to enable.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TrackingCaps: u32 {
        const ORIENTATION = 0x0010;
        const MAG_YAW_CORRECTION = 0x0020;
        const POSITION = 0x0040;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackingState {
    pub head_pose: PoseState,
    pub status_flags: StatusFlags,
}

impl TrackingState {
    pub fn untracked() -> Self {
        TrackingState::default()
    }

    pub fn tracked(orientation: Quaternion) -> Self {
        TrackingState {
            head_pose: PoseState {
                pose: Pose { orientation, position: Vector3::default() },
                ..PoseState::default()
            },
            status_flags: StatusFlags::ORIENTATION_TRACKED | StatusFlags::HMD_CONNECTED,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HmdDescription {
    pub product_name: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub refresh_rate_hz: f32,
}

impl fmt::Display for HmdDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} by {} (serial {}, {:.0} Hz)",
            self.product_name, self.manufacturer, self.serial_number, self.refresh_rate_hz
        )
    }
}

// --- Standard Error Type ---
#[derive(Debug, Error)]
pub enum HmdError {
    /// The tracking runtime could not be started or has failed
    #[error("Runtime error: {0}")]
    RuntimeError(String),
    /// Error originating from the underlying device communication
    #[error("Device error: {0}")]
    DeviceError(String),
    /// Error reading data from the device or internal state
    #[error("Read error: {0}")]
    ReadError(String),
    /// Error writing commands or configuration to the device
    #[error("Write error: {0}")]
    WriteError(String),
    /// Error during device configuration or setup
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// Error related to multithreading locks (e.g., poisoned)
    #[error("Lock error: {0}")]
    LockError(String),
    /// Error sending a command to the reader thread
    #[error("Command send error: {0}")]
    CommandSendError(String),
    /// Malformed data received from the device
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl<T> From<std::sync::PoisonError<T>> for HmdError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        HmdError::LockError(format!("Lock poisoned: {}", err))
    }
}

impl<T> From<std::sync::mpsc::SendError<T>> for HmdError {
    fn from(err: std::sync::mpsc::SendError<T>) -> Self {
        HmdError::CommandSendError(format!("Reader thread is gone: {}", err))
    }
}

/// A handle to one tracked headset, valid until it is handed back to
/// [`TrackingRuntime::destroy_device`].
pub trait HmdDevice {
    fn description(&self) -> HmdDescription;

    /// Enables tracking. Fails when a `required` capability is not available.
    fn configure_tracking(
        &mut self,
        supported: TrackingCaps,
        required: TrackingCaps,
    ) -> Result<(), HmdError>;

    fn begin_frame_timing(&mut self, frame_index: u64) -> FrameTiming;

    /// Returns the head pose predicted for `abs_time_seconds`.
    fn tracking_state(&self, abs_time_seconds: f64) -> Result<TrackingState, HmdError>;

    fn end_frame_timing(&mut self);
}

pub trait TrackingRuntime {
    type Device: HmdDevice;

    fn initialize(&mut self) -> Result<(), HmdError>;

    /// Returns `Ok(None)` when there is no device at `index`.
    fn create_device(&mut self, index: usize) -> Result<Option<Self::Device>, HmdError>;

    fn destroy_device(&mut self, device: Self::Device);

    /// Must be safe to call whether or not a device was ever created.
    fn shutdown(&mut self);
}
