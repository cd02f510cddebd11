use crate::poller::PollerConfig;
use crate::session::SessionConfig;
use clap::{Parser, ValueEnum};
use hiwonder_hmd::ImuFrequency;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverKind {
    /// Hiwonder serial IMU worn as a head tracker
    Hiwonder,
    /// Generated motion, no hardware needed
    Simulated,
}

#[derive(Parser, Debug)]
#[command(
    name = "read_hmd",
    version,
    about = "Print HMD yaw, pitch and roll until a key is pressed"
)]
pub struct Args {
    /// Tracking runtime to read from
    #[arg(long, value_enum, default_value_t = DriverKind::Hiwonder)]
    pub driver: DriverKind,

    /// Device to open, in runtime enumeration order
    #[arg(long, default_value_t = 0)]
    pub device_index: usize,

    /// Serial port of the head tracker; system ports are enumerated when omitted
    #[arg(long)]
    pub port: Option<String>,

    #[arg(long, default_value_t = 9600)]
    pub baud_rate: u32,

    /// Sensor output rate, e.g. 100hz or 200hz
    #[arg(long, default_value = "100hz")]
    pub imu_rate: ImuFrequency,

    /// Delay after every sample, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub interval_ms: u64,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Let the runtime use the magnetometer to correct yaw drift
    #[arg(long)]
    pub mag_yaw_correction: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticConfig {
    pub session: SessionConfig,
    pub poller: PollerConfig,
}

impl Args {
    pub fn diagnostic_config(&self) -> DiagnosticConfig {
        DiagnosticConfig {
            session: SessionConfig {
                device_index: self.device_index,
                mag_yaw_correction: self.mag_yaw_correction,
            },
            poller: PollerConfig {
                interval: Duration::from_millis(self.interval_ms),
                max_frames: self.frames,
            },
        }
    }
}
