//! CLI command handlers.

pub mod client;
pub mod config;
pub mod device;
pub mod nodes;
pub mod serve;
