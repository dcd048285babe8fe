use std::path::PathBuf;

use snafu::Snafu;
use tsbench_core::{BackendError, ConfigError, Status};
use tsbench_datafusion::SqlError;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid property override '{raw}': {source}"))]
    PropertyOverride { raw: String, source: ConfigError },

    #[snafu(display("Failed to load properties from {}: {source}", path.display()))]
    PropertiesFile { path: PathBuf, source: ConfigError },

    #[snafu(display("Invalid configuration: {source}"))]
    Config { source: ConfigError },

    #[snafu(display("Failed to open session: {source}"))]
    Connect { source: BackendError },

    #[snafu(display("Failed to start the SQL backend: {source}"))]
    Sql { source: SqlError },

    #[snafu(display("Invalid {what} {value:?}: {reason}"))]
    InvalidArgument {
        what: &'static str,
        value: String,
        reason: &'static str,
    },

    #[snafu(display("{operation} {key} returned {status}. Rerun with RUST_LOG=debug for details."))]
    Operation {
        operation: &'static str,
        key: String,
        status: Status,
    },
}
