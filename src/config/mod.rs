mod config;

pub use config::{BackupConfig, ConfigError, DEFAULT_CONFIG_FILE_NAME};
