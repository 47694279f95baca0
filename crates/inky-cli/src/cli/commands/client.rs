//! One-shot remote calls against a running server.

use anyhow::Result;
use chrono::Local;
use inky_core::nodes::{IP_BUFFER, NODES_BUFFER, TIME_BUFFER};
use inky_core::rpc::RpcClient;

/// Timestamp format shown in the `time` buffer.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub async fn register(
    addr: &str,
    name: &str,
    location: &str,
    font_size: Option<u32>,
) -> Result<()> {
    let mut client = RpcClient::connect(addr).await?;
    client.register_buffer(name, location, font_size).await?;
    println!("Registered '{name}' at {location}");
    Ok(())
}

pub async fn unregister(addr: &str, name: &str) -> Result<()> {
    let mut client = RpcClient::connect(addr).await?;
    client.unregister_buffer(name).await?;
    println!("Unregistered '{name}'");
    Ok(())
}

pub async fn update(addr: &str, buffer: &str, row: &str, content: &str) -> Result<()> {
    let mut client = RpcClient::connect(addr).await?;
    client.update_row(buffer, row, content).await
}

pub async fn clear(addr: &str, buffer: &str) -> Result<()> {
    let mut client = RpcClient::connect(addr).await?;
    client.clear_buffer(buffer).await
}

pub async fn reset(addr: &str) -> Result<()> {
    let mut client = RpcClient::connect(addr).await?;
    client.reset().await
}

/// Fills three corners with sample node rows, the time and an address.
pub async fn demo(addr: &str) -> Result<()> {
    let mut client = RpcClient::connect(addr).await?;
    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();

    client.register_buffer(NODES_BUFFER, "lowerleft", None).await?;
    for (row, content) in [
        ("pi-1", "pi1: Ready"),
        ("pi-4", "pi2: Offline"),
        ("pi-3", "pi3: DiskPressure"),
        ("pi-2", "pi4: MemPressure"),
    ] {
        client.update_row(NODES_BUFFER, row, content).await?;
    }

    client.register_buffer(TIME_BUFFER, "upperleft", None).await?;
    client.update_row(TIME_BUFFER, "0", &timestamp).await?;

    client.register_buffer(IP_BUFFER, "upperright", None).await?;
    client.update_row(IP_BUFFER, "0", "192.168.234.32").await?;

    println!("Demo buffers sent to {addr}");
    Ok(())
}
