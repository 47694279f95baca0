//! Periodic snapshotting of the screen.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::screen::Screen;
use crate::shutdown::{ShutdownFlag, wait_until_set};
use crate::snapshot::RenderSnapshot;

/// Timing for [`run_ticker`].
#[derive(Debug, Clone, Copy)]
pub struct TickerOptions {
    /// Time between snapshots. The first one is taken immediately.
    pub interval: Duration,
    /// How often the shutdown flag is checked between ticks.
    pub shutdown_poll: Duration,
}

/// Renders `screen` every tick and queues the snapshot on `sender`.
///
/// Returns when `shutdown` is set or the receiving side is gone. The screen
/// lock is only held for the render itself.
pub async fn run_ticker<F>(
    screen: Arc<Screen>,
    sender: UnboundedSender<RenderSnapshot>,
    shutdown: Arc<F>,
    options: TickerOptions,
) where
    F: ShutdownFlag + ?Sized,
{
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = wait_until_set(shutdown.as_ref(), options.shutdown_poll) => {
                info!("snapshot ticker stopping");
                return;
            }
            _ = ticker.tick() => {
                let snapshot = screen.render();
                debug!(buffers = snapshot.len(), "queued render snapshot");
                if sender.send(snapshot).is_err() {
                    warn!("snapshot channel closed, ticker stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::location::Location;
    use crate::shutdown::LocalFlag;

    fn options() -> TickerOptions {
        TickerOptions {
            interval: Duration::from_secs(10),
            shutdown_poll: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_snapshots_on_every_interval() {
        let screen = Arc::new(Screen::new());
        screen.register_buffer("ip", Location::UpperRight, 12).unwrap();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let shutdown = Arc::new(LocalFlag::new());

        let task = tokio::spawn(run_ticker(
            Arc::clone(&screen),
            sender,
            Arc::clone(&shutdown),
            options(),
        ));

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.get(Location::UpperRight).unwrap().content, "");

        screen.update_row("ip", "0", "192.168.234.32").unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(
            second.get(Location::UpperRight).unwrap().content,
            "192.168.234.32\n"
        );

        shutdown.set().unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_on_shutdown() {
        let screen = Arc::new(Screen::new());
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let shutdown = Arc::new(LocalFlag::new());
        shutdown.set().unwrap();

        run_ticker(screen, sender, shutdown, options()).await;

        // the sender is gone once the ticker returns
        let mut queued = 0;
        while receiver.recv().await.is_some() {
            queued += 1;
        }
        assert!(queued <= 1, "ticker kept running after shutdown: {queued} snapshots");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_when_receiver_dropped() {
        let screen = Arc::new(Screen::new());
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);

        run_ticker(screen, sender, Arc::new(LocalFlag::new()), options()).await;
    }
}
