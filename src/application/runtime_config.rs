use std::path::PathBuf;

use crate::cli::Cli;

/// What the CLI asks the application to do, stripped of logging concerns.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub config_path: PathBuf,
    pub once: bool,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            config_path: cli.config,
            once: cli.once,
        }
    }
}
