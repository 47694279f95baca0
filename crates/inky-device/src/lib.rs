//! Device process for the inky e-ink service.
//!
//! Runs in its own OS process, apart from the control logic. Snapshots arrive
//! as JSON lines on an input pipe; the consumer redraws the panel only when
//! the screen actually changed, and draws an offline screen on the way out.

pub mod channel;
pub mod consumer;
pub mod fonts;
pub mod panel;
pub mod png_panel;

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use inky_core::config::Config;
use inky_core::shutdown::ShutdownFlag;
use tracing::{info, warn};

pub use consumer::{ConsumerExit, ConsumerOptions, Device, run_consumer};
pub use panel::{Panel, TextExtent};
pub use png_panel::PngPanel;

/// Everything the device process needs to run.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub width: u32,
    pub height: u32,
    pub output: PathBuf,
    pub startup_message: String,
    pub offline_message: String,
    pub poll: Duration,
    pub retry_backoff: Duration,
}

impl From<&Config> for DeviceOptions {
    fn from(config: &Config) -> Self {
        Self {
            width: config.display.width,
            height: config.display.height,
            output: config.display.output_path(),
            startup_message: config.display.startup_message.clone(),
            offline_message: config.display.offline_message.clone(),
            poll: config.pipeline.device_poll(),
            retry_backoff: config.pipeline.retry_backoff(),
        }
    }
}

/// Runs the device until `shutdown` is set or `input` closes.
///
/// # Errors
/// Returns an error if the snapshot reader cannot be started.
pub fn run<R, F>(input: R, shutdown: &F, options: DeviceOptions) -> Result<ConsumerExit>
where
    R: BufRead + Send + 'static,
    F: ShutdownFlag + ?Sized,
{
    let panel = PngPanel::new(options.width, options.height, options.output.clone());
    info!(
        output = %panel.output().display(),
        width = options.width,
        height = options.height,
        "device started"
    );
    let device = Device::new(panel, options.startup_message, options.offline_message);
    if let Err(err) = device.draw_startup() {
        warn!("{err:#}");
    }

    let receiver = channel::spawn_reader(input)?;
    let exit = run_consumer(
        &device,
        &receiver,
        shutdown,
        ConsumerOptions {
            poll: options.poll,
            retry_backoff: options.retry_backoff,
        },
    );
    info!("exiting device process");
    Ok(exit)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use inky_core::shutdown::{FileFlag, LocalFlag};
    use inky_core::{Location, Screen};
    use tempfile::tempdir;

    use super::*;

    fn options(output: PathBuf) -> DeviceOptions {
        DeviceOptions {
            output,
            poll: Duration::from_millis(10),
            ..DeviceOptions::from(&Config::default())
        }
    }

    #[test]
    fn test_run_draws_and_exits_at_eof() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("panel.png");
        let screen = Screen::new();
        screen.register_buffer("nodes", Location::LowerLeft, 12).unwrap();
        screen.update_row("nodes", "pi-1", "pi-1: Ready").unwrap();
        let input = screen.render().encode_line().unwrap();

        let exit = run(
            Cursor::new(input.into_bytes()),
            &LocalFlag::new(),
            options(output.clone()),
        )
        .unwrap();

        assert_eq!(exit, ConsumerExit::Disconnected);
        let frame = image::open(&output).unwrap().to_luma8();
        assert_eq!(frame.dimensions(), (212, 104));
    }

    #[test]
    fn test_run_stops_on_preset_file_flag() {
        let dir = tempdir().unwrap();
        let flag = FileFlag::new(dir.path().join("shutdown"));
        flag.set().unwrap();

        let exit = run(
            Cursor::new(Vec::new()),
            &flag,
            options(dir.path().join("panel.png")),
        )
        .unwrap();

        assert_eq!(exit, ConsumerExit::Shutdown);
        assert!(dir.path().join("panel.png").exists());
    }
}
