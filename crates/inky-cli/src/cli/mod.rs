//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use inky_core::config::{self, Config};

use crate::logging;

mod commands;

#[derive(Parser)]
#[command(name = "inky")]
#[command(version = "0.1")]
#[command(about = "E-ink status display service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $INKY_HOME/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Where producers reach the server.
#[derive(clap::Args, Debug, Clone)]
struct ServerArgs {
    /// Server address (default: server.listen from config)
    #[arg(long, env = "INKY_ADDR", value_name = "HOST:PORT")]
    addr: Option<String>,
}

impl ServerArgs {
    fn resolve(&self, config: &Config) -> String {
        self.addr
            .clone()
            .unwrap_or_else(|| config.server.listen.clone())
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the display service (remote-call server, ticker, device process)
    Serve,
    /// Run the device process (started by `serve`)
    #[command(hide = true)]
    Device {
        /// Marker file whose existence requests shutdown
        #[arg(long, value_name = "PATH")]
        shutdown_flag: PathBuf,
    },
    /// Call the remote operations of a running server
    Client {
        #[command(flatten)]
        server: ServerArgs,

        #[command(subcommand)]
        command: ClientCommands,
    },
    /// Feed node status events (JSON lines on stdin) to the display
    Nodes {
        #[command(flatten)]
        server: ServerArgs,

        /// Also show this address in the upper right corner
        #[arg(long, value_name = "ADDR")]
        ip: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ClientCommands {
    /// Register a named buffer at a screen location
    Register {
        name: String,
        /// upperleft, upperright, lowerleft, lowerright, center, centerleft, centerright
        location: String,
        #[arg(long)]
        font_size: Option<u32>,
    },
    /// Remove a buffer and free its location
    Unregister { name: String },
    /// Set the content of one row
    Update {
        buffer: String,
        row: String,
        content: String,
    },
    /// Remove all rows of a buffer
    Clear { buffer: String },
    /// Remove every buffer
    Reset,
    /// Fill the screen with sample buffers
    Demo,
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::paths::config_path);

    // config commands must work without a valid config
    let command = match cli.command {
        Commands::Config { command } => {
            return match command {
                ConfigCommands::Path => {
                    commands::config::path(&config_path);
                    Ok(())
                }
                ConfigCommands::Init => commands::config::init(&config_path),
            };
        }
        command => command,
    };

    let config = Config::load_from(&config_path).context("load config")?;
    let _log_guard = logging::init(&config.log)?;

    match command {
        // the device process never starts a runtime
        Commands::Device { shutdown_flag } => commands::device::run(&config, &shutdown_flag),
        Commands::Serve => block_on(commands::serve::run(&config, &config_path)),
        Commands::Client { server, command } => {
            block_on(client(&server.resolve(&config), command))
        }
        Commands::Nodes { server, ip } => block_on(commands::nodes::run(
            commands::nodes::NodesOptions {
                addr: server.resolve(&config),
                ip,
                retry_backoff: config.pipeline.retry_backoff(),
            },
        )),
        Commands::Config { .. } => Ok(()),
    }
}

fn block_on<F>(future: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(future)
}

async fn client(addr: &str, command: ClientCommands) -> Result<()> {
    match command {
        ClientCommands::Register {
            name,
            location,
            font_size,
        } => commands::client::register(addr, &name, &location, font_size).await,
        ClientCommands::Unregister { name } => commands::client::unregister(addr, &name).await,
        ClientCommands::Update {
            buffer,
            row,
            content,
        } => commands::client::update(addr, &buffer, &row, &content).await,
        ClientCommands::Clear { buffer } => commands::client::clear(addr, &buffer).await,
        ClientCommands::Reset => commands::client::reset(addr).await,
        ClientCommands::Demo => commands::client::demo(addr).await,
    }
}
