//! CLI argument definitions for labelsync-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Docker label driven proxy host sync agent.
///
/// Watches container lifecycle events and keeps Nginx Proxy Manager
/// proxy hosts in step with the labels of running containers.
#[derive(Parser, Debug)]
#[command(name = "labelsync-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Optional TOML configuration file.
    ///
    /// Environment variables override values read from the file.
    #[arg(short, long, env = "LABELSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without starting the agent.
    #[arg(long)]
    pub validate: bool,
}
