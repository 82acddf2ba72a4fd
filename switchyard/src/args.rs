use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Switchyard inference broker
#[derive(Debug, Parser)]
#[command(name = "switchyard", about = "Routes inference requests to the best backend a subscription allows")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "SWITCHYARD_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directive, e.g. `info` or `switchyard_broker=debug`
    #[arg(long, default_value = "info", env = "SWITCHYARD_LOG")]
    pub log: String,
}
