//! The device loop: drain snapshots, skip repeats, redraw the panel.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use inky_core::DEFAULT_FONT_SIZE;
use inky_core::location::Location;
use inky_core::shutdown::ShutdownFlag;
use inky_core::snapshot::RenderSnapshot;
use tracing::{debug, error, info, warn};

use crate::fonts;
use crate::panel::Panel;

/// Owns the panel. Every full-frame draw takes the panel lock, so the
/// startup and offline screens never interleave with a snapshot draw.
pub struct Device<P> {
    panel: Mutex<P>,
    startup_message: String,
    offline_message: String,
}

impl<P: Panel> Device<P> {
    pub fn new(
        panel: P,
        startup_message: impl Into<String>,
        offline_message: impl Into<String>,
    ) -> Self {
        Self {
            panel: Mutex::new(panel),
            startup_message: startup_message.into(),
            offline_message: offline_message.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, P> {
        self.panel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Draws the startup splash.
    ///
    /// # Errors
    /// Returns an error if the panel refresh fails.
    pub fn draw_startup(&self) -> Result<()> {
        info!("writing startup screen");
        let mut panel = self.lock();
        compose(
            &mut *panel,
            [(Location::Center, self.startup_message.as_str(), DEFAULT_FONT_SIZE)],
        )
        .context("draw startup screen")
    }

    /// Draws every buffer of `snapshot` at its location and refreshes once.
    ///
    /// # Errors
    /// Returns an error if the panel refresh fails.
    pub fn draw_snapshot(&self, snapshot: &RenderSnapshot) -> Result<()> {
        let mut panel = self.lock();
        compose(
            &mut *panel,
            snapshot
                .iter()
                .map(|(location, buffer)| (*location, buffer.content.as_str(), buffer.font_size)),
        )
        .context("draw render snapshot")
    }

    /// Draws the offline screen shown after shutdown.
    ///
    /// # Errors
    /// Returns an error if the panel refresh fails.
    pub fn draw_offline(&self) -> Result<()> {
        info!("writing offline screen");
        let mut panel = self.lock();
        compose(
            &mut *panel,
            [(
                Location::CenterRight,
                self.offline_message.as_str(),
                fonts::largest_font_size(),
            )],
        )
        .context("draw offline screen")
    }

    #[cfg(test)]
    fn into_panel(self) -> P {
        self.panel.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the frame, places each text block, and refreshes once.
fn compose<'a, P, I>(panel: &mut P, blocks: I) -> Result<()>
where
    P: Panel + ?Sized,
    I: IntoIterator<Item = (Location, &'a str, u32)>,
{
    let (width, height) = panel.size();
    panel.clear();
    for (location, text, font_size) in blocks {
        let extent = panel.measure(text, font_size);
        let (x, y) = location.place(extent.width, extent.height, width, height);
        panel.draw_text(x, y, text, font_size);
    }
    panel.flush()
}

/// Loop timing.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerOptions {
    /// Longest wait on the channel before the shutdown flag is checked again.
    pub poll: Duration,
    /// Pause after a failed draw.
    pub retry_backoff: Duration,
}

/// Why the consumer loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// The shutdown flag was set.
    Shutdown,
    /// The producer side of the channel went away.
    Disconnected,
}

/// Runs the device loop until shutdown, then draws the offline screen once.
///
/// A snapshot equal to the last one drawn is skipped. A failed draw is logged,
/// does not count as drawn, and is followed by `retry_backoff`.
pub fn run_consumer<P, F>(
    device: &Device<P>,
    receiver: &Receiver<RenderSnapshot>,
    shutdown: &F,
    options: ConsumerOptions,
) -> ConsumerExit
where
    P: Panel,
    F: ShutdownFlag + ?Sized,
{
    // An empty screen keeps the startup splash up.
    let mut previous = RenderSnapshot::default();

    let exit = loop {
        if shutdown.is_set() {
            break ConsumerExit::Shutdown;
        }
        match receiver.recv_timeout(options.poll) {
            Ok(snapshot) => {
                if snapshot == previous {
                    debug!("snapshot unchanged, skipping refresh");
                    continue;
                }
                match device.draw_snapshot(&snapshot) {
                    Ok(()) => {
                        debug!(buffers = snapshot.len(), "panel refreshed");
                        previous = snapshot;
                    }
                    Err(err) => {
                        warn!("panel refresh failed: {err:#}");
                        thread::sleep(options.retry_backoff);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break ConsumerExit::Disconnected,
        }
    };

    info!(?exit, "device loop stopping");
    if let Err(err) = device.draw_offline() {
        error!("{err:#}");
    }
    exit
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::mpsc;

    use anyhow::bail;
    use inky_core::buffer::RenderedBuffer;
    use inky_core::shutdown::{FileFlag, LocalFlag};
    use tempfile::tempdir;

    use super::*;
    use crate::panel::TextExtent;

    /// What one refresh put on the panel.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Frame {
        texts: Vec<(i32, i32, String, u32)>,
    }

    /// Records frames; fails the first `failures` flushes.
    #[derive(Debug, Default)]
    struct RecordingPanel {
        pending: Vec<(i32, i32, String, u32)>,
        frames: Vec<Frame>,
        failures: usize,
    }

    impl Panel for RecordingPanel {
        fn size(&self) -> (u32, u32) {
            (212, 104)
        }

        fn measure(&self, text: &str, _font_size: u32) -> TextExtent {
            TextExtent {
                width: 10 * text.lines().map(str::len).max().unwrap_or(0) as u32,
                height: 10 * text.lines().count() as u32,
            }
        }

        fn clear(&mut self) {
            self.pending.clear();
        }

        fn draw_text(&mut self, x: i32, y: i32, text: &str, font_size: u32) {
            self.pending.push((x, y, text.to_string(), font_size));
        }

        fn flush(&mut self) -> Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                self.pending.clear();
                bail!("spi bus timeout");
            }
            self.frames.push(Frame {
                texts: std::mem::take(&mut self.pending),
            });
            Ok(())
        }
    }

    fn options() -> ConsumerOptions {
        ConsumerOptions {
            poll: Duration::from_millis(10),
            retry_backoff: Duration::ZERO,
        }
    }

    fn snapshot(entries: &[(Location, &str)]) -> RenderSnapshot {
        RenderSnapshot::new(
            entries
                .iter()
                .map(|(location, content)| {
                    (
                        *location,
                        RenderedBuffer {
                            content: (*content).to_string(),
                            font_size: 12,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn offline_frame() -> Frame {
        // "offline" is 7 chars wide at 10px per char, one line tall.
        Frame {
            texts: vec![(142, 47, "offline".to_string(), 20)],
        }
    }

    #[test]
    fn test_identical_snapshots_draw_once() {
        let device = Device::new(RecordingPanel::default(), "starting", "offline");
        let (sender, receiver) = mpsc::channel();
        let nodes = snapshot(&[(Location::LowerLeft, "Ready\nOffline\n")]);
        sender.send(nodes.clone()).unwrap();
        sender.send(nodes.clone()).unwrap();
        sender.send(nodes).unwrap();
        drop(sender);

        let exit = run_consumer(&device, &receiver, &LocalFlag::new(), options());

        assert_eq!(exit, ConsumerExit::Disconnected);
        let frames = device.into_panel().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0].texts,
            vec![(0, 84, "Ready\nOffline\n".to_string(), 12)]
        );
        assert_eq!(frames[1], offline_frame());
    }

    #[test]
    fn test_changed_snapshot_redraws_all_locations() {
        let device = Device::new(RecordingPanel::default(), "starting", "offline");
        let (sender, receiver) = mpsc::channel();
        sender
            .send(snapshot(&[(Location::UpperLeft, "12:00\n")]))
            .unwrap();
        sender
            .send(snapshot(&[
                (Location::UpperLeft, "12:01\n"),
                (Location::UpperRight, "10.0.0.1\n"),
            ]))
            .unwrap();
        drop(sender);

        run_consumer(&device, &receiver, &LocalFlag::new(), options());

        let frames = device.into_panel().frames;
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[1].texts,
            vec![
                (0, 0, "12:01\n".to_string(), 12),
                (132, 0, "10.0.0.1\n".to_string(), 12),
            ]
        );
    }

    #[test]
    fn test_empty_first_snapshot_keeps_startup_screen() {
        let device = Device::new(RecordingPanel::default(), "starting", "offline");
        device.draw_startup().unwrap();
        let (sender, receiver) = mpsc::channel();
        sender.send(RenderSnapshot::default()).unwrap();
        drop(sender);

        run_consumer(&device, &receiver, &LocalFlag::new(), options());

        let frames = device.into_panel().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].texts, vec![(66, 47, "starting".to_string(), 12)]);
        assert_eq!(frames[1], offline_frame());
    }

    #[test]
    fn test_failed_draw_is_retried_on_next_delivery() {
        let panel = RecordingPanel {
            failures: 1,
            ..Default::default()
        };
        let device = Device::new(panel, "starting", "offline");
        let (sender, receiver) = mpsc::channel();
        let nodes = snapshot(&[(Location::LowerLeft, "Ready\n")]);
        sender.send(nodes.clone()).unwrap();
        sender.send(nodes).unwrap();
        drop(sender);

        run_consumer(&device, &receiver, &LocalFlag::new(), options());

        let frames = device.into_panel().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].texts, vec![(0, 94, "Ready\n".to_string(), 12)]);
    }

    #[test]
    fn test_shutdown_flag_draws_offline_exactly_once() {
        let device = Arc::new(Device::new(RecordingPanel::default(), "starting", "offline"));
        let (sender, receiver) = mpsc::channel();
        let shutdown = Arc::new(LocalFlag::new());

        let handle = {
            let device = Arc::clone(&device);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                run_consumer(device.as_ref(), &receiver, shutdown.as_ref(), options())
            })
        };

        sender
            .send(snapshot(&[(Location::Center, "hello\n")]))
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        shutdown.set().unwrap();

        assert_eq!(handle.join().unwrap(), ConsumerExit::Shutdown);
        let device = Arc::into_inner(device).unwrap();
        let frames = device.into_panel().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].texts, vec![(81, 47, "hello\n".to_string(), 12)]);
        assert_eq!(frames[1], offline_frame());
        drop(sender);
    }

    #[test]
    fn test_file_flag_raised_while_polling_draws_offline_once() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("shutdown");
        let device = Arc::new(Device::new(RecordingPanel::default(), "starting", "offline"));
        let (sender, receiver) = mpsc::channel();

        let handle = {
            let device = Arc::clone(&device);
            let marker = marker.clone();
            thread::spawn(move || {
                run_consumer(device.as_ref(), &receiver, &FileFlag::new(marker), options())
            })
        };

        sender
            .send(snapshot(&[(Location::LowerLeft, "Ready\n")]))
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        FileFlag::new(&marker).set().unwrap();

        assert_eq!(handle.join().unwrap(), ConsumerExit::Shutdown);
        let frames = Arc::into_inner(device).unwrap().into_panel().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].texts, vec![(0, 94, "Ready\n".to_string(), 12)]);
        assert_eq!(frames[1], offline_frame());
        drop(sender);
    }
}
