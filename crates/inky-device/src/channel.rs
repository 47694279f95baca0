//! Receiving side of the snapshot pipe.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use anyhow::{Context, Result};
use inky_core::snapshot::RenderSnapshot;
use tracing::{debug, warn};

/// Decodes snapshot lines from `input` on a background thread.
///
/// Lines that fail to decode are logged and dropped. The returned receiver
/// disconnects once `input` reaches EOF or fails.
///
/// # Errors
/// Returns an error if the reader thread cannot be spawned.
pub fn spawn_reader<R>(input: R) -> Result<Receiver<RenderSnapshot>>
where
    R: BufRead + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("snapshot-reader".to_string())
        .spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("snapshot pipe read failed: {err}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match RenderSnapshot::decode_line(&line) {
                    Ok(snapshot) => {
                        if sender.send(snapshot).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("dropping undecodable snapshot: {err:#}"),
                }
            }
            debug!("snapshot pipe closed");
        })
        .context("spawn snapshot reader thread")?;
    Ok(receiver)
}
