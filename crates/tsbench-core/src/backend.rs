//! Storage backends behind one capability trait.
//!
//! A backend accepts drained bulk payloads and answers half-open range scans.
//! Implementations in this crate:
//!
//! - [`session::RemoteBackend`]: forwards payloads and range queries to a
//!   remote time-series session through the narrow [`session::SessionClient`]
//!   interface.
//! - [`parquet::ParquetBackend`]: keeps every written row for the process
//!   lifetime, dumps them into one Parquet file at teardown, and scans a
//!   Parquet file with row-group pruning and a pushed-down key predicate.
//! - [`dataset::DatasetBackend`]: same write path, but scans the file in
//!   fixed-size record batches and filters rows after decoding.
//!
//! Field projection is not supported by any backend: a scan with an explicit
//! field set fails with [`BackendError::Unsupported`].

use std::collections::BTreeSet;

use crate::model::{Key, KeyedRow, ScanWindow};
use crate::payload::BulkPayload;

pub mod dataset;
mod error;
pub mod parquet;
pub mod session;

pub use error::{BackendError, BackendResult};
pub(crate) use error::*;

/// Outcome of a successful scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// At least one row was inside the window.
    Found(Vec<KeyedRow>),
    /// No row was inside the window.
    NotFound,
}

impl ScanResult {
    /// `Found` for a non-empty row list, `NotFound` otherwise.
    pub fn from_rows(rows: Vec<KeyedRow>) -> Self {
        if rows.is_empty() {
            ScanResult::NotFound
        } else {
            ScanResult::Found(rows)
        }
    }

    /// Rows of the scan (empty for `NotFound`).
    pub fn into_rows(self) -> Vec<KeyedRow> {
        match self {
            ScanResult::Found(rows) => rows,
            ScanResult::NotFound => Vec::new(),
        }
    }
}

/// A storage backend driven by the gateway.
///
/// Every method blocks the calling thread until the backend has finished.
pub trait Backend: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Persist one drained payload.
    fn bulk_write(&mut self, payload: BulkPayload) -> BackendResult<()>;

    /// Return every row of `table` whose key lies in `window`.
    ///
    /// `fields` is the harness projection; `Some` is rejected as unsupported.
    /// Returned rows are keyed by full path (`table.field`).
    fn scan(
        &mut self,
        table: &str,
        window: ScanWindow,
        fields: Option<&BTreeSet<String>>,
    ) -> BackendResult<ScanResult>;

    /// Delete the row of `table` at `key`.
    fn delete(&mut self, table: &str, key: Key) -> BackendResult<()> {
        let _ = (table, key);
        UnsupportedSnafu {
            backend: self.name(),
            operation: "delete",
        }
        .fail()
    }

    /// Make buffered writes durable and release held connections.
    fn teardown(&mut self) -> BackendResult<()>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn bulk_write(&mut self, payload: BulkPayload) -> BackendResult<()> {
        (**self).bulk_write(payload)
    }

    fn scan(
        &mut self,
        table: &str,
        window: ScanWindow,
        fields: Option<&BTreeSet<String>>,
    ) -> BackendResult<ScanResult> {
        (**self).scan(table, window, fields)
    }

    fn delete(&mut self, table: &str, key: Key) -> BackendResult<()> {
        (**self).delete(table, key)
    }

    fn teardown(&mut self) -> BackendResult<()> {
        (**self).teardown()
    }
}

/// Fail with `Unsupported` when a scan asks for specific fields.
pub fn reject_projection(
    backend: &'static str,
    fields: Option<&BTreeSet<String>>,
) -> BackendResult<()> {
    match fields {
        Some(_) => UnsupportedSnafu {
            backend,
            operation: "scan with field projection",
        }
        .fail(),
        None => Ok(()),
    }
}
