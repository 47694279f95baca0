//! Control process: remote-call server, snapshot ticker and the device child.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use inky_core::Screen;
use inky_core::config::Config;
use inky_core::rpc;
use inky_core::shutdown::{self, FileFlag, LocalFlag, ShutdownFlag, wait_until_set};
use inky_core::snapshot::RenderSnapshot;
use inky_core::ticker::{TickerOptions, run_ticker};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs until the first interrupt, then lets the device draw its offline
/// screen before returning.
///
/// # Errors
/// Returns an error if the device process cannot be started or the listen
/// address cannot be bound.
pub async fn run(config: &Config, config_path: &Path) -> Result<()> {
    let pipeline = &config.pipeline;
    let poll = pipeline.shutdown_poll();

    let shutdown = Arc::new(LocalFlag::new());
    {
        let shutdown = Arc::clone(&shutdown);
        shutdown::install_signal_handler(pipeline.max_signals, move |count| {
            info!(count, "shutdown requested");
            if let Err(err) = shutdown.set() {
                error!("{err:#}");
            }
        })?;
    }

    let flag_dir = tempfile::Builder::new()
        .prefix("inky-")
        .tempdir()
        .context("create shutdown flag directory")?;
    let device_flag = FileFlag::new(flag_dir.path().join("shutdown"));
    let mut device = spawn_device(config_path, device_flag.path())?;
    let stdin = device
        .stdin
        .take()
        .context("device process has no stdin pipe")?;
    info!(pid = device.id(), "device process started");

    let listener = TcpListener::bind(config.server.listen.as_str())
        .await
        .with_context(|| format!("bind {}", config.server.listen))?;
    info!(listen = %config.server.listen, "remote-call server listening");

    let screen = Arc::new(Screen::new());
    let (sender, receiver) = mpsc::unbounded_channel();

    let _bridge = shutdown::spawn_bridge(Arc::clone(&shutdown), device_flag, poll)?;
    let forwarder = tokio::spawn(forward_snapshots(receiver, stdin));
    let ticker = tokio::spawn(run_ticker(
        Arc::clone(&screen),
        sender,
        Arc::clone(&shutdown),
        TickerOptions {
            interval: pipeline.tick_interval(),
            shutdown_poll: poll,
        },
    ));
    let server = tokio::spawn(rpc::serve(
        listener,
        Arc::clone(&screen),
        Arc::clone(&shutdown),
        poll,
    ));

    tokio::select! {
        () = wait_until_set(shutdown.as_ref(), poll) => {}
        status = device.wait() => {
            // nothing left to draw on; stop the rest
            match status {
                Ok(status) => error!(%status, "device process exited early"),
                Err(err) => error!("failed to wait for device process: {err}"),
            }
            shutdown.set()?;
        }
    }
    info!("shutting down");

    for task in [ticker, server] {
        if let Err(err) = task.await {
            warn!("task failed during shutdown: {err}");
        }
    }
    // one grace period covers both the pipe drain and the device exit
    let deadline = Instant::now() + pipeline.shutdown_grace();
    finish_forwarder(forwarder, deadline).await;
    stop_device(&mut device, deadline).await;
    drop(flag_dir);
    info!("stopped");
    Ok(())
}

fn spawn_device(config_path: &Path, shutdown_flag: &Path) -> Result<Child> {
    let exe = std::env::current_exe().context("locate inky executable")?;
    Command::new(exe)
        .arg("--config")
        .arg(config_path)
        .arg("device")
        .arg("--shutdown-flag")
        .arg(shutdown_flag)
        .stdin(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("spawn device process")
}

/// Writes queued snapshots to the device pipe, one JSON line each.
///
/// Once the pipe breaks the remaining snapshots are drained and dropped.
async fn forward_snapshots(
    mut receiver: UnboundedReceiver<RenderSnapshot>,
    mut stdin: ChildStdin,
) {
    let mut broken = false;
    while let Some(snapshot) = receiver.recv().await {
        if broken {
            continue;
        }
        let line = match snapshot.encode_line() {
            Ok(line) => line,
            Err(err) => {
                warn!("{err:#}");
                continue;
            }
        };
        match write_line(&mut stdin, &line).await {
            Ok(()) => debug!(buffers = snapshot.len(), "snapshot sent to device"),
            Err(err) => {
                error!("device pipe closed: {err}");
                broken = true;
            }
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

/// Waits for queued snapshots to reach the device. The ticker has dropped the
/// sender, so the forwarder ends once the queue is empty; past `deadline` it is
/// aborted, which closes the pipe.
async fn finish_forwarder(forwarder: JoinHandle<()>, deadline: Instant) {
    let abort = forwarder.abort_handle();
    match tokio::time::timeout_at(deadline, forwarder).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("snapshot forwarder failed: {err}"),
        Err(_) => {
            warn!("device is not reading its pipe, dropping queued snapshots");
            abort.abort();
        }
    }
}

async fn stop_device(device: &mut Child, deadline: Instant) {
    match tokio::time::timeout_at(deadline, device.wait()).await {
        Ok(Ok(status)) => info!(%status, "device process exited"),
        Ok(Err(err)) => warn!("failed to wait for device process: {err}"),
        Err(_) => {
            warn!("device process did not exit in time, killing it");
            if let Err(err) = device.kill().await {
                error!("failed to kill device process: {err}");
            }
        }
    }
}
