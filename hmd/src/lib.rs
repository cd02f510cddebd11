pub mod config;
pub mod console;
pub mod data;
pub mod poller;
pub mod session;
pub mod simulated;

pub use config::{Args, DiagnosticConfig, DriverKind};
pub use console::{
    ConsoleDisplay, ExitSignal, KeyboardExit, OrientationDisplay, StderrLog, TerminalDisplay,
};
pub use data::OrientationSample;
pub use hmd_traits::{HmdDevice, HmdError, TrackingRuntime};
pub use poller::{OrientationPoller, PollOutcome, PollReport, PollerConfig};
pub use session::{DeviceSession, SessionConfig};

/// Opens a session on `runtime` and polls it until `exit` fires or the frame
/// limit is reached. The display is only opened once a device was found.
///
/// Returns `Ok(None)` when the runtime has no device. The session is
/// released before returning on every path.
pub fn run_with<R, O, K>(
    runtime: R,
    config: &DiagnosticConfig,
    open_display: impl FnOnce() -> Result<O, HmdError>,
    exit: K,
) -> Result<Option<PollReport>, HmdError>
where
    R: TrackingRuntime,
    O: OrientationDisplay,
    K: ExitSignal,
{
    let mut session = DeviceSession::init(runtime, &config.session)?;
    let Some(device) = session.device_mut() else {
        return Ok(None);
    };

    let display = open_display()?;
    let report = OrientationPoller::new(device, display, exit, config.poller.clone()).run()?;

    session.clear();
    Ok(Some(report))
}

/// Polls `runtime` on the terminal, stopping at the first key press.
pub fn run_diagnostic<R: TrackingRuntime>(
    runtime: R,
    config: &DiagnosticConfig,
) -> Result<Option<PollReport>, HmdError> {
    run_with(runtime, config, TerminalDisplay::open, KeyboardExit)
}
