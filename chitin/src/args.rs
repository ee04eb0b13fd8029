use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Chitin billing webhook service
#[derive(Debug, Parser)]
#[command(name = "chitin", about = "Applies billing provider subscription events to user entitlements")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "chitin.toml", env = "CHITIN_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "CHITIN_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directives, e.g. `info,chitin_webhook=debug`
    #[arg(long, default_value = "info", env = "CHITIN_LOG")]
    pub log_filter: String,
}
