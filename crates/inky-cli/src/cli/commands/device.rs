//! Device process entry point.

use std::io::{self, BufReader};
use std::path::Path;

use anyhow::Result;
use inky_core::config::Config;
use inky_core::shutdown::{self, FileFlag};
use inky_device::DeviceOptions;
use tracing::{debug, info, info_span};

/// Draws snapshots from stdin until the control process raises
/// `shutdown_flag` or closes the pipe.
///
/// Interrupts are only counted here; the control process decides when the
/// device stops, so the offline screen is drawn after the last snapshot.
pub fn run(config: &Config, shutdown_flag: &Path) -> Result<()> {
    let _span = info_span!("device").entered();

    shutdown::install_signal_handler(config.pipeline.max_signals, |count| {
        debug!(count, "signal received, waiting for the control process");
    })?;

    let flag = FileFlag::new(shutdown_flag);
    let exit = inky_device::run(
        BufReader::new(io::stdin()),
        &flag,
        DeviceOptions::from(config),
    )?;
    info!(?exit, "device stopped");
    Ok(())
}
