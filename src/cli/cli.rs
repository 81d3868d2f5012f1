use std::path::PathBuf;

use clap::Parser;

use crate::application::LogLevel;
use crate::config::DEFAULT_CONFIG_FILE_NAME;

/// Snapshots a directory tree into timestamped backup folders whenever it
/// changes, waiting for bursts of writes to settle first.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Path of the YAML configuration file
    #[clap(long, short, default_value = DEFAULT_CONFIG_FILE_NAME)]
    pub config: PathBuf,

    #[clap(long, short, default_value = "info", value_enum)]
    pub log_level: LogLevel,

    /// Back up once if the tree changed since the newest backup, then exit
    #[clap(long)]
    pub once: bool,
}
