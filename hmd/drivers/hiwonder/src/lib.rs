pub mod frame;

pub use frame::{FrameParser, ReadFrame};
pub use hmd_traits::{
    FrameClock, FrameTiming, HmdDescription, HmdDevice, HmdError, Pose, PoseState, Quaternion,
    StatusFlags, TrackingCaps, TrackingRuntime, TrackingState, Vector3,
};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::{mpsc, Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, error, info, warn};

/// A quaternion older than this no longer counts as tracked.
pub const STALE_AFTER: Duration = Duration::from_millis(100);
/// Longest horizon the gyro is extrapolated over.
pub const MAX_PREDICTION_SECONDS: f64 = 0.05;

const STANDARD_GRAVITY: f32 = 9.80665;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ImuFrequency {
    #[strum(serialize = "0.2hz")]
    Hz0_2,
    #[strum(serialize = "0.5hz")]
    Hz0_5,
    #[strum(serialize = "1hz")]
    Hz1,
    #[strum(serialize = "2hz")]
    Hz2,
    #[strum(serialize = "5hz")]
    Hz5,
    #[strum(serialize = "10hz")]
    Hz10,
    #[strum(serialize = "20hz")]
    Hz20,
    #[strum(serialize = "50hz")]
    Hz50,
    #[strum(serialize = "100hz")]
    Hz100,
    #[strum(serialize = "200hz")]
    Hz200,
}

impl ImuFrequency {
    /// Value of the output rate register.
    pub fn to_byte(&self) -> u8 {
        match self {
            ImuFrequency::Hz0_2 => 0x01,
            ImuFrequency::Hz0_5 => 0x02,
            ImuFrequency::Hz1 => 0x03,
            ImuFrequency::Hz2 => 0x04,
            ImuFrequency::Hz5 => 0x05,
            ImuFrequency::Hz10 => 0x06,
            ImuFrequency::Hz20 => 0x07,
            ImuFrequency::Hz50 => 0x08,
            ImuFrequency::Hz100 => 0x09,
            ImuFrequency::Hz200 => 0x0B,
        }
    }

    pub fn hz(&self) -> f32 {
        match self {
            ImuFrequency::Hz0_2 => 0.2,
            ImuFrequency::Hz0_5 => 0.5,
            ImuFrequency::Hz1 => 1.0,
            ImuFrequency::Hz2 => 2.0,
            ImuFrequency::Hz5 => 5.0,
            ImuFrequency::Hz10 => 10.0,
            ImuFrequency::Hz20 => 20.0,
            ImuFrequency::Hz50 => 50.0,
            ImuFrequency::Hz100 => 100.0,
            ImuFrequency::Hz200 => 200.0,
        }
    }
}

/// Sensor is worn flat with its Z axis up; the head frame is Y-up.
pub fn sensor_to_head(q: Quaternion) -> Quaternion {
    Quaternion::new(q.w, q.x, q.z, -q.y)
}

fn sensor_vector_to_head(v: Vector3) -> Vector3 {
    Vector3::new(v.x, v.z, -v.y)
}

/// Latest readings shared between the reader thread and the device handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestSample {
    pub quaternion: Option<Quaternion>,
    pub received_at: Option<Instant>,
    /// deg/s, sensor frame
    pub gyro: Vector3,
    /// g, sensor frame
    pub acceleration: Vector3,
}

impl LatestSample {
    fn apply(&mut self, frame: ReadFrame) {
        match frame {
            ReadFrame::Quaternion { w, x, y, z } => {
                self.quaternion = Some(Quaternion::new(w, x, y, z));
                self.received_at = Some(Instant::now());
            }
            ReadFrame::Gyro { x, y, z, .. } => self.gyro = Vector3::new(x, y, z),
            ReadFrame::Acceleration { x, y, z, .. } => self.acceleration = Vector3::new(x, y, z),
            _ => (),
        }
    }
}

/// Builds the head pose for `abs_time` from a sample taken at `sample_time`
/// that is `age` old. The orientation is extrapolated with the gyro over at
/// most [`MAX_PREDICTION_SECONDS`].
pub fn predict_state(
    sample: &LatestSample,
    sample_time: f64,
    age: Duration,
    abs_time: f64,
    connected: bool,
) -> TrackingState {
    let mut status_flags = StatusFlags::empty();
    if connected {
        status_flags |= StatusFlags::HMD_CONNECTED;
    }

    let Some(raw) = sample.quaternion else {
        return TrackingState { status_flags, ..TrackingState::default() };
    };

    if age <= STALE_AFTER {
        status_flags |= StatusFlags::ORIENTATION_TRACKED;
    }

    let measured = sensor_to_head(raw.normalized());
    let angular_velocity =
        sensor_vector_to_head(sample.gyro).scale(std::f32::consts::PI / 180.0);
    let horizon = (abs_time - sample_time).clamp(0.0, MAX_PREDICTION_SECONDS);
    let orientation = measured.integrate(angular_velocity, horizon as f32);

    // The accelerometer reads +1 g straight up at rest.
    let specific_force =
        measured.rotate(sensor_vector_to_head(sample.acceleration).scale(STANDARD_GRAVITY));
    let linear_acceleration = Vector3::new(
        specific_force.x,
        specific_force.y - STANDARD_GRAVITY,
        specific_force.z,
    );

    TrackingState {
        head_pose: PoseState {
            pose: Pose { orientation, position: Vector3::default() },
            angular_velocity,
            linear_acceleration,
            time_in_seconds: abs_time,
        },
        status_flags,
    }
}

/// Register writes that enable orientation tracking, in the order the sensor
/// expects them: unlock, axis mode, output content, rate, save.
pub fn tracking_commands(
    supported: TrackingCaps,
    required: TrackingCaps,
    rate: ImuFrequency,
) -> Result<Vec<[u8; 5]>, HmdError> {
    if required.contains(TrackingCaps::POSITION) {
        return Err(HmdError::ConfigurationError(
            "position tracking is not available on an IMU head tracker".to_string(),
        ));
    }

    // 9-axis fuses the magnetometer into yaw; 6-axis is gyro and accel only.
    let axis_mode = if supported.contains(TrackingCaps::MAG_YAW_CORRECTION) { 0x00 } else { 0x01 };
    // acc | gyro | angle, then quaternion in the high byte
    let low_byte = 0x02 | 0x04 | 0x08;
    let high_byte = 0x02;

    Ok(vec![
        [0xFF, 0xAA, 0x69, 0x88, 0xB5], // Unlock
        [0xFF, 0xAA, 0x24, axis_mode, 0x00], // Axis mode
        [0xFF, 0xAA, 0x02, low_byte, high_byte], // Output content
        [0xFF, 0xAA, 0x03, rate.to_byte(), 0x00], // Rate
        [0xFF, 0xAA, 0x00, 0x00, 0x00], // Save
    ])
}

/// Requests handled by the reader thread, which owns the serial port.
#[derive(Debug)]
pub enum HmdCommand {
    /// Writes the registers in order and reports the outcome on the reply channel.
    Configure(Vec<[u8; 5]>, mpsc::Sender<Result<(), HmdError>>),
    Stop,
}

fn write_command(port: &mut dyn SerialPort, command: &[u8]) -> Result<(), HmdError> {
    port.write_all(command)
        .map_err(|e| HmdError::WriteError(format!("Failed to write command: {}", e)))?;
    // Give the sensor time to apply the register write.
    thread::sleep(Duration::from_millis(30));
    Ok(())
}

fn read_port(port: &mut dyn SerialPort, buffer: &mut [u8]) -> Result<usize, HmdError> {
    match port.read(buffer) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
        Err(e) => Err(HmdError::ReadError(format!("Failed to read data: {}", e))),
    }
}

pub struct HiwonderHmd {
    port_name: String,
    latest: Arc<RwLock<LatestSample>>,
    running: Arc<RwLock<bool>>,
    command_tx: mpsc::Sender<HmdCommand>,
    reader: Option<JoinHandle<()>>,
    clock: FrameClock,
    output_rate: ImuFrequency,
}

impl HiwonderHmd {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        output_rate: ImuFrequency,
    ) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(20))
            .open()?;
        Ok(Self::with_port(port_name, port, output_rate))
    }

    /// Wraps an already open port. The reader thread takes ownership of it.
    pub fn with_port(
        port_name: &str,
        port: Box<dyn SerialPort>,
        output_rate: ImuFrequency,
    ) -> Self {
        let latest = Arc::new(RwLock::new(LatestSample::default()));
        let running = Arc::new(RwLock::new(true));
        let (command_tx, command_rx) = mpsc::channel();
        let reader = Self::start_reading_thread(
            port,
            command_rx,
            Arc::clone(&latest),
            Arc::clone(&running),
        );

        HiwonderHmd {
            port_name: port_name.to_string(),
            latest,
            running,
            command_tx,
            reader: Some(reader),
            clock: FrameClock::new(output_rate.hz()),
            output_rate,
        }
    }

    fn start_reading_thread(
        mut port: Box<dyn SerialPort>,
        command_rx: mpsc::Receiver<HmdCommand>,
        latest: Arc<RwLock<LatestSample>>,
        running: Arc<RwLock<bool>>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut parser = FrameParser::new(Some(512));
            let mut buffer = [0u8; 1024];

            while let Ok(guard) = running.read() {
                if !*guard {
                    break;
                }
                drop(guard);

                match command_rx.try_recv() {
                    Ok(HmdCommand::Configure(commands, reply)) => {
                        let result = commands
                            .iter()
                            .try_for_each(|command| write_command(port.as_mut(), command));
                        // The caller may have given up waiting.
                        let _ = reply.send(result);
                    }
                    Ok(HmdCommand::Stop) | Err(mpsc::TryRecvError::Disconnected) => break,
                    Err(mpsc::TryRecvError::Empty) => (),
                }

                match read_port(port.as_mut(), &mut buffer) {
                    Ok(0) => (),
                    Ok(n) => {
                        let frames = parser.parse(&buffer[..n]);
                        match latest.write() {
                            Ok(mut sample) => frames.into_iter().for_each(|f| sample.apply(f)),
                            Err(_) => {
                                error!("Sample lock poisoned, stopping reader");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        error!("{}", e);
                        break;
                    }
                }
            }

            if let Ok(mut guard) = running.write() {
                *guard = false;
            }
            debug!("Reader thread exited");
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.read().map(|r| *r).unwrap_or(false)
    }

    pub fn stop(&mut self) {
        // A reader that already exited has dropped its receiver.
        let _ = self.command_tx.send(HmdCommand::Stop);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("Reader thread for {} panicked", self.port_name);
            }
        }
    }
}

impl HmdDevice for HiwonderHmd {
    fn description(&self) -> HmdDescription {
        HmdDescription {
            product_name: "Hiwonder IMU head tracker".to_string(),
            manufacturer: "Hiwonder".to_string(),
            serial_number: self.port_name.clone(),
            refresh_rate_hz: self.output_rate.hz(),
        }
    }

    fn configure_tracking(
        &mut self,
        supported: TrackingCaps,
        required: TrackingCaps,
    ) -> Result<(), HmdError> {
        let commands = tracking_commands(supported, required, self.output_rate)?;

        let (reply_tx, reply_rx) = mpsc::channel();
        self.command_tx.send(HmdCommand::Configure(commands, reply_tx))?;
        reply_rx.recv().map_err(|_| {
            HmdError::CommandSendError("Reader thread exited before configuring".to_string())
        })??;

        info!(
            "Configured {} ({}-axis, {})",
            self.port_name,
            if supported.contains(TrackingCaps::MAG_YAW_CORRECTION) { 9 } else { 6 },
            self.output_rate
        );
        Ok(())
    }

    fn begin_frame_timing(&mut self, frame_index: u64) -> FrameTiming {
        self.clock.begin(frame_index)
    }

    fn tracking_state(&self, abs_time_seconds: f64) -> Result<TrackingState, HmdError> {
        let sample = *self.latest.read()?;
        let (sample_time, age) = match sample.received_at {
            Some(at) => (self.clock.seconds_at(at), at.elapsed()),
            None => (abs_time_seconds, Duration::MAX),
        };
        Ok(predict_state(&sample, sample_time, age, abs_time_seconds, self.is_running()))
    }

    fn end_frame_timing(&mut self) {
        self.clock.end();
    }
}

impl Drop for HiwonderHmd {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct HiwonderRuntime {
    port: Option<String>,
    baud_rate: u32,
    output_rate: ImuFrequency,
    initialized: bool,
}

impl HiwonderRuntime {
    /// With `port` unset, devices are the system serial ports in enumeration order.
    pub fn new(port: Option<String>, baud_rate: u32, output_rate: ImuFrequency) -> Self {
        HiwonderRuntime { port, baud_rate, output_rate, initialized: false }
    }

    fn port_for_index(&self, index: usize) -> Result<Option<String>, HmdError> {
        if let Some(port) = &self.port {
            return Ok((index == 0).then(|| port.clone()));
        }
        let ports = serialport::available_ports().map_err(|e| {
            HmdError::RuntimeError(format!("Failed to enumerate serial ports: {}", e))
        })?;
        debug!("Found {} serial ports", ports.len());
        Ok(ports.into_iter().nth(index).map(|p| p.port_name))
    }
}

fn is_missing_port(err: &serialport::Error) -> bool {
    matches!(
        err.kind(),
        serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(io::ErrorKind::NotFound)
    )
}

impl TrackingRuntime for HiwonderRuntime {
    type Device = HiwonderHmd;

    fn initialize(&mut self) -> Result<(), HmdError> {
        if self.baud_rate == 0 {
            return Err(HmdError::RuntimeError("baud rate must be non-zero".to_string()));
        }
        self.initialized = true;
        Ok(())
    }

    fn create_device(&mut self, index: usize) -> Result<Option<HiwonderHmd>, HmdError> {
        if !self.initialized {
            return Err(HmdError::RuntimeError("runtime is not initialized".to_string()));
        }
        let Some(port_name) = self.port_for_index(index)? else {
            return Ok(None);
        };

        match HiwonderHmd::open(&port_name, self.baud_rate, self.output_rate) {
            Ok(device) => {
                info!("Opened {} at {} baud", port_name, self.baud_rate);
                Ok(Some(device))
            }
            Err(e) if is_missing_port(&e) => {
                warn!("No device on {}: {}", port_name, e);
                Ok(None)
            }
            Err(e) => Err(HmdError::DeviceError(format!("Failed to open {}: {}", port_name, e))),
        }
    }

    fn destroy_device(&mut self, mut device: HiwonderHmd) {
        device.stop();
        debug!("Released {}", device.port_name);
    }

    fn shutdown(&mut self) {
        self.initialized = false;
    }
}
