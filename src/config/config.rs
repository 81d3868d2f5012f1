use compio::{fs::File, io::AsyncReadExt, io::BufReader};
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use std::{
    borrow::Cow,
    io::Cursor,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::ext::BestEffortPathExt;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "dirsnap.yaml";

const SOURCE_DIRECTORY_KEY: &str = "source_directory";
const BACKUP_DIRECTORY_KEY: &str = "backup_directory";
const BACKUP_INTERVAL_KEY: &str = "backup_interval";
const RESCAN_ON_INTERVAL_KEY: &str = "rescan_on_interval";

/// Everything the backup daemon needs to run, read from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    pub source_directory: PathBuf,
    pub backup_directory: PathBuf,
    pub backup_interval: Duration,
    pub rescan_on_interval: bool,
}

impl BackupConfig {
    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!("Opening config file: {}", path.best_effort_path_display());
        let file = File::open(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;

        let cursor = Cursor::new(file);
        let mut reader = BufReader::new(cursor);
        let res = reader.read_to_string(String::new()).await;
        let bytes = res.0.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        debug!("Successfully read config file: {bytes} bytes");

        res.1.as_str().try_into()
    }

    fn from_mapping(top_level: &LinkedHashMap<Yaml, Yaml>) -> Result<Self, ConfigError> {
        let source_directory = required_path(top_level, SOURCE_DIRECTORY_KEY)?;
        let backup_directory = required_path(top_level, BACKUP_DIRECTORY_KEY)?;
        ensure!(
            source_directory != backup_directory,
            SameDirectorySnafu {
                path: source_directory.best_effort_path_display(),
            }
        );

        let interval_secs = lookup(top_level, BACKUP_INTERVAL_KEY)
            .context(MissingFieldSnafu {
                field: BACKUP_INTERVAL_KEY,
            })?
            .as_integer()
            .filter(|secs| *secs > 0)
            .context(InvalidFieldSnafu {
                field: BACKUP_INTERVAL_KEY,
                expected: "a positive number of seconds",
            })?;

        let rescan_on_interval = match lookup(top_level, RESCAN_ON_INTERVAL_KEY) {
            None => false,
            Some(value) => value.as_bool().context(InvalidFieldSnafu {
                field: RESCAN_ON_INTERVAL_KEY,
                expected: "true or false",
            })?,
        };

        Ok(BackupConfig {
            source_directory,
            backup_directory,
            backup_interval: Duration::from_secs(interval_secs.unsigned_abs()),
            rescan_on_interval,
        })
    }
}

fn lookup<'a, 'input>(
    top_level: &'a LinkedHashMap<Yaml<'input>, Yaml<'input>>,
    key: &'static str,
) -> Option<&'a Yaml<'input>> {
    top_level
        .get(&Yaml::Value(Scalar::String(Cow::Borrowed(key))))
        .filter(|value| !value.is_null())
}

fn required_path(
    top_level: &LinkedHashMap<Yaml, Yaml>,
    key: &'static str,
) -> Result<PathBuf, ConfigError> {
    let value = lookup(top_level, key).context(MissingFieldSnafu { field: key })?;
    value
        .as_str()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .context(InvalidFieldSnafu {
            field: key,
            expected: "a directory path",
        })
}

impl TryFrom<&str> for BackupConfig {
    type Error = ConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().context(MalformedConfigSnafu)?;
        let top_level = document.as_mapping().context(TopLevelNotMapSnafu)?;

        Self::from_mapping(top_level)
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted config file"))]
    MalformedConfig,
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Missing required config field '{}'", field))]
    MissingField { field: &'static str },
    #[snafu(display("Config field '{}' should be {}", field, expected))]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[snafu(display("Source and backup directory are both {}", path))]
    SameDirectory { path: String },
}
