use anyhow::Context;
use clap::Parser;
use hiwonder_hmd::HiwonderRuntime;
use hmd::simulated::SimulatedRuntime;
use hmd::{run_diagnostic, Args, DriverKind, StderrLog};
use tracing::info;
use tracing_subscriber::EnvFilter;

//* run by `cargo run --bin read_hmd -- --driver simulated` */

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never land on the redrawn display.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(|| StderrLog)
        .init();

    let args = Args::parse();
    let config = args.diagnostic_config();

    let report = match args.driver {
        DriverKind::Hiwonder => run_diagnostic(
            HiwonderRuntime::new(args.port.clone(), args.baud_rate, args.imu_rate),
            &config,
        ),
        DriverKind::Simulated => run_diagnostic(SimulatedRuntime::sweeping(), &config),
    }
    .context("HMD diagnostic failed")?;

    if let Some(report) = report {
        info!(
            "Stopped ({:?}) after {} frames: {} rendered, {} untracked",
            report.outcome, report.frames, report.rendered, report.untracked
        );
    }

    Ok(())
}
