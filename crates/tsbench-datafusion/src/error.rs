use std::path::PathBuf;

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use snafu::Snafu;
use tsbench_core::{BackendError, ConfigError};

/// Errors raised by the SQL backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SqlError {
    /// The private async runtime could not be started.
    #[snafu(display("Failed to build the query runtime: {source}"))]
    Runtime {
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Backend settings could not be parsed.
    #[snafu(display("Invalid SQL backend configuration: {source}"))]
    Config {
        /// Underlying configuration error.
        source: ConfigError,
    },

    /// Planning or executing a statement failed.
    #[snafu(display("DataFusion failed to run `{statement}`: {source}"))]
    DataFusion {
        /// Statement (or registration step) being run.
        statement: String,
        /// Underlying DataFusion error.
        #[snafu(source(from(DataFusionError, Box::new)))]
        source: Box<DataFusionError>,
    },

    /// A result column could not be converted to text.
    #[snafu(display("Failed to decode query result: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The read path does not point at a file.
    #[snafu(display("Parquet file not found: {}", path.display()))]
    MissingFile {
        /// Configured read path.
        path: PathBuf,
    },

    /// The read path cannot be handed to the engine as a URL.
    #[snafu(display("Parquet path is not valid UTF-8: {}", path.display()))]
    NonUtf8Path {
        /// Configured read path.
        path: PathBuf,
    },

    /// The result set has no key column.
    #[snafu(display("Query result has no key column `{column}`"))]
    MissingKeyColumn {
        /// Expected key column name.
        column: String,
    },

    /// The key column is not a 64-bit integer.
    #[snafu(display("Key column `{column}` has type {datatype}, expected Int64"))]
    KeyColumnType {
        /// Key column name.
        column: String,
        /// Actual column type.
        datatype: DataType,
    },
}

/// Result alias for the SQL backend.
pub type SqlResult<T> = Result<T, SqlError>;

impl From<SqlError> for BackendError {
    fn from(err: SqlError) -> Self {
        BackendError::external("sql", err)
    }
}
