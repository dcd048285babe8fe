//! Error types and SNAFU context selectors for the `backend` module.
//!
//! Selectors are `pub(crate)` so each backend attaches its own context;
//! backends living in other crates report through [`BackendError::external`].

use arrow::{datatypes::DataType, error::ArrowError};
use parquet::errors::ParquetError;
use snafu::prelude::*;

use super::session::SessionError;

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by storage backends.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    /// The backend does not implement the requested operation.
    #[snafu(display("Operation not supported by the {backend} backend: {operation}"))]
    Unsupported {
        /// Backend name.
        backend: &'static str,
        /// Operation that was requested.
        operation: &'static str,
    },

    /// A call into the remote session failed.
    #[snafu(display("Session call {operation} failed: {source}"))]
    Session {
        /// Session call that failed.
        operation: &'static str,
        /// Underlying session error.
        source: SessionError,
    },

    /// The Parquet file could not be opened or decoded.
    #[snafu(display("Parquet read error on {path}: {source}"))]
    ParquetRead {
        /// File being read.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// The Parquet dump could not be written.
    #[snafu(display("Parquet write error on {path}: {source}"))]
    ParquetWrite {
        /// File being written.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Arrow failed while building, decoding or filtering a batch.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Local filesystem error.
    #[snafu(display("I/O error at {path}: {source}"))]
    Io {
        /// Path involved in the failing call.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file has no key column.
    #[snafu(display("Missing key column {column:?}"))]
    MissingKeyColumn {
        /// Expected key column name.
        column: String,
    },

    /// The key column is not a 64-bit integer column.
    #[snafu(display("Key column {column:?} has type {datatype:?}, expected Int64"))]
    KeyColumnType {
        /// Key column name.
        column: String,
        /// Actual Arrow type.
        datatype: DataType,
    },

    /// A value column does not hold raw bytes.
    #[snafu(display("Value column {column:?} has type {datatype:?}, expected Binary"))]
    ValueColumnType {
        /// Value column name.
        column: String,
        /// Actual Arrow type.
        datatype: DataType,
    },

    /// A buffered path has no column in the declared dump schema.
    #[snafu(display("Field {path:?} is not declared in the dump schema"))]
    UndeclaredField {
        /// The undeclared path.
        path: String,
    },

    /// A backend implemented outside this crate failed.
    #[snafu(display("{backend} backend error: {source}"))]
    External {
        /// Backend name.
        backend: &'static str,
        /// Underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BackendError {
    /// Wrap an error raised by a backend implemented in another crate.
    pub fn external(
        backend: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        BackendError::External {
            backend,
            source: source.into(),
        }
    }

    /// True for [`BackendError::Unsupported`].
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BackendError::Unsupported { .. })
    }
}
