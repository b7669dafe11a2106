//! devpanel command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "devpanel", version)]
#[command(about = "OTA firmware upload and AP scanning for devpanel devices", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.config/devpanel/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a firmware image once the device accepts OTA
    Ota {
        /// Firmware image to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// OTA endpoint, overriding the configuration
        #[arg(long)]
        url: Option<String>,

        /// Give up if the device is not ready within this many seconds
        #[arg(long, default_value_t = 60)]
        wait: u64,
    },
    /// Print OTA readiness changes until interrupted
    WatchOta {
        /// OTA endpoint, overriding the configuration
        #[arg(long)]
        url: Option<String>,
    },
    /// Poll the device's access-point scan and print the results
    Apscan {
        /// Ask the device for a fresh scan
        #[arg(long)]
        force: bool,

        /// AP scan endpoint, overriding the configuration
        #[arg(long)]
        url: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,devpanel=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration ready");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli.command, config))
}
