//! Shutdown flags and the watcher that bridges them across the process boundary.
//!
//! Two one-way flags are involved. The [`LocalFlag`] is set by signal handling
//! inside the control process. The [`FileFlag`] is what the device process
//! watches; only [`spawn_bridge`] sets it, after seeing the local flag.
//!
//! Neither flag is ever waited on without a timeout. Callers poll in bounded
//! steps and re-check, which keeps every loop responsive to the other side
//! going away.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

/// Upper bound on a single sleep inside a polling wait.
const POLL_STEP: Duration = Duration::from_millis(20);

/// A boolean that only ever goes from unset to set.
pub trait ShutdownFlag: Send + Sync {
    fn is_set(&self) -> bool;

    /// Sets the flag. Setting an already-set flag is a no-op.
    ///
    /// # Errors
    /// Returns an error if the flag's backing store cannot be written.
    fn set(&self) -> Result<()>;

    /// Waits up to `timeout` for the flag; returns whether it is set.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_set() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(POLL_STEP));
        }
    }
}

/// In-process flag, set from signal handling.
#[derive(Debug, Default)]
pub struct LocalFlag {
    set: Mutex<bool>,
    changed: Condvar,
}

impl LocalFlag {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ShutdownFlag for LocalFlag {
    fn is_set(&self) -> bool {
        *self.lock()
    }

    fn set(&self) -> Result<()> {
        *self.lock() = true;
        self.changed.notify_all();
        Ok(())
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Cross-process flag backed by a marker file: set means the file exists.
#[derive(Debug, Clone)]
pub struct FileFlag {
    path: PathBuf,
}

impl FileFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ShutdownFlag for FileFlag {
    fn is_set(&self) -> bool {
        self.path.exists()
    }

    fn set(&self) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("create shutdown marker {}", self.path.display()))?;
        Ok(())
    }
}

/// Starts the watcher that copies the local flag onto the cross-process flag.
///
/// The thread polls `local` every `poll`, sets `remote` once it sees it, and exits.
pub fn spawn_bridge<L, R>(local: Arc<L>, remote: R, poll: Duration) -> Result<JoinHandle<()>>
where
    L: ShutdownFlag + ?Sized + 'static,
    R: ShutdownFlag + 'static,
{
    thread::Builder::new()
        .name("shutdown-bridge".to_string())
        .spawn(move || {
            loop {
                if !local.wait_timeout(poll) {
                    continue;
                }
                match remote.set() {
                    Ok(()) => {
                        info!("signaling device shutdown");
                        return;
                    }
                    Err(err) => warn!("failed to set device shutdown flag: {err:#}"),
                }
                thread::sleep(poll);
            }
        })
        .context("spawn shutdown bridge thread")
}

/// Polls `flag` every `poll` until it is set, without blocking the runtime.
pub async fn wait_until_set<F>(flag: &F, poll: Duration)
where
    F: ShutdownFlag + ?Sized,
{
    while !flag.is_set() {
        tokio::time::sleep(poll).await;
    }
}

/// What a received signal should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Start (or continue) a graceful shutdown; carries the signal count.
    Shutdown(u32),
    /// Give up on graceful shutdown and terminate now.
    Abort,
}

/// Counts received signals and escalates once `max_signals` is reached.
#[derive(Debug)]
pub struct SignalCounter {
    received: AtomicU32,
    max_signals: u32,
}

impl SignalCounter {
    pub fn new(max_signals: u32) -> Self {
        Self {
            received: AtomicU32::new(0),
            max_signals: max_signals.max(1),
        }
    }

    pub fn record(&self) -> SignalAction {
        let count = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.max_signals {
            SignalAction::Abort
        } else {
            SignalAction::Shutdown(count)
        }
    }
}

/// Installs the SIGINT/SIGTERM/SIGHUP handler.
///
/// Each signal below `max_signals` calls `on_signal` with the running count;
/// the `max_signals`-th one exits the process with status 130.
///
/// # Errors
/// Returns an error if a handler is already installed.
pub fn install_signal_handler<F>(max_signals: u32, on_signal: F) -> Result<()>
where
    F: Fn(u32) + Send + 'static,
{
    let counter = SignalCounter::new(max_signals);
    ctrlc::set_handler(move || match counter.record() {
        SignalAction::Shutdown(count) => on_signal(count),
        SignalAction::Abort => {
            error!("received {max_signals} signals, aborting");
            std::process::exit(130);
        }
    })
    .context("install signal handler")
}
