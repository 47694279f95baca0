//! Node status feeder.
//!
//! Reads node events as JSON lines on stdin, reduces them to one row per
//! node and pushes changed rows to the display server.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use inky_core::nodes::{
    IP_BUFFER, NODES_BUFFER, NodeEvent, NodeRowTracker, NodeStatus, TIME_BUFFER,
};
use inky_core::rpc::RpcClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::client::TIMESTAMP_FORMAT;

/// Rows are re-sent at least this often even when unchanged.
const REFRESH_AFTER: Duration = Duration::from_secs(60);

pub struct NodesOptions {
    pub addr: String,
    pub ip: Option<String>,
    pub retry_backoff: Duration,
}

/// Runs until stdin closes.
///
/// # Errors
/// Returns an error if stdin cannot be read. Server failures are retried.
pub async fn run(options: NodesOptions) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tracker = NodeRowTracker::new(REFRESH_AFTER);
    let mut client: Option<RpcClient> = None;

    while let Some(line) = lines.next_line().await.context("read node events")? {
        if line.trim().is_empty() {
            continue;
        }
        let event: NodeEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!("skipping malformed node event: {err}");
                continue;
            }
        };

        let status = NodeStatus::from(&event);
        info!(
            identity = %status.identity,
            node = %status.display_name,
            status = %status.status,
            "node event"
        );
        if !tracker.should_send(&status, Instant::now()) {
            continue;
        }

        loop {
            match publish(&mut client, &options, &status).await {
                Ok(()) => break,
                Err(err) => {
                    warn!("failed to update display: {err:#}");
                    client = None;
                    tokio::time::sleep(options.retry_backoff).await;
                }
            }
        }
    }

    info!("node event stream closed");
    Ok(())
}

async fn publish(
    client: &mut Option<RpcClient>,
    options: &NodesOptions,
    status: &NodeStatus,
) -> Result<()> {
    let rpc = match client.take() {
        Some(rpc) => rpc,
        None => connect(options).await?,
    };
    let rpc = client.insert(rpc);

    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    rpc.update_row(TIME_BUFFER, "0", &timestamp).await?;
    if let Some(ip) = &options.ip {
        rpc.update_row(IP_BUFFER, "0", ip).await?;
    }
    rpc.update_row(NODES_BUFFER, status.row(), &status.content())
        .await
}

/// Connects and (re-)registers the feeder's buffers.
async fn connect(options: &NodesOptions) -> Result<RpcClient> {
    let mut rpc = RpcClient::connect(options.addr.as_str()).await?;
    rpc.register_buffer(NODES_BUFFER, "lowerleft", None).await?;
    rpc.register_buffer(TIME_BUFFER, "upperleft", None).await?;
    if options.ip.is_some() {
        rpc.register_buffer(IP_BUFFER, "upperright", None).await?;
    }
    info!(addr = %options.addr, "connected to display server");
    Ok(rpc)
}
