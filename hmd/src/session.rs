use hmd_traits::{HmdDevice, HmdError, TrackingCaps, TrackingRuntime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Which device to open, in runtime enumeration order
    pub device_index: usize,
    pub mag_yaw_correction: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig { device_index: 0, mag_yaw_correction: false }
    }
}

impl SessionConfig {
    pub fn tracking_caps(&self) -> TrackingCaps {
        let mut caps = TrackingCaps::ORIENTATION | TrackingCaps::POSITION;
        if self.mag_yaw_correction {
            caps |= TrackingCaps::MAG_YAW_CORRECTION;
        }
        caps
    }
}

/// Owns a started tracking runtime and, when one was found, a device handle.
///
/// The handle is destroyed and the runtime shut down exactly once, either
/// through [`DeviceSession::clear`] or when the session is dropped.
pub struct DeviceSession<R: TrackingRuntime> {
    runtime: R,
    device: Option<R::Device>,
    released: bool,
}

impl<R: TrackingRuntime> DeviceSession<R> {
    /// Starts the runtime, opens the configured device and enables tracking.
    ///
    /// A missing device is not an error: the session is returned without a
    /// handle and [`DeviceSession::is_valid`] reports false.
    pub fn init(mut runtime: R, config: &SessionConfig) -> Result<Self, HmdError> {
        runtime.initialize()?;

        // Shutdown is owed from here on, including on the error paths below.
        let mut session = DeviceSession { runtime, device: None, released: false };
        session.device = session.runtime.create_device(config.device_index)?;

        match session.device.as_mut() {
            Some(device) => {
                device.configure_tracking(config.tracking_caps(), TrackingCaps::empty())?;
                info!("Tracking {}", device.description());
            }
            None => warn!("No HMD found at index {}", config.device_index),
        }

        Ok(session)
    }

    pub fn is_valid(&self) -> bool {
        self.device.is_some()
    }

    pub fn device_mut(&mut self) -> Option<&mut R::Device> {
        self.device.as_mut()
    }

    /// Releases the device and shuts the runtime down.
    pub fn clear(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(device) = self.device.take() {
            self.runtime.destroy_device(device);
            debug!("Device released");
        }
        self.runtime.shutdown();
        debug!("Runtime shut down");
    }
}

impl<R: TrackingRuntime> Drop for DeviceSession<R> {
    fn drop(&mut self) {
        self.release();
    }
}
