//! Remote time-series session backend.
//!
//! The remote database is reached through [`SessionClient`], a narrow
//! interface over the five calls the gateway needs: open/close, row- and
//! column-oriented inserts, a ranged query over a set of paths, and a ranged
//! delete. [`memory::MemorySession`] is the in-process implementation used by
//! tests and dry runs.

use std::collections::BTreeSet;

use snafu::prelude::*;
use tracing::debug;

use crate::backend::{Backend, BackendResult, ScanResult, SessionSnafu, reject_projection};
use crate::config::{
    ConfigResult, Properties, SESSION_HOST, SESSION_PASSWORD, SESSION_PORT, SESSION_USER,
};
use crate::model::{Key, KeyedRow, ScanWindow, SparseRow, Value, table_wildcard};
use crate::payload::{BulkPayload, ColumnMajorPayload, RowMajorPayload};

pub mod memory;

/// Default session host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default session port.
pub const DEFAULT_PORT: u16 = 6888;
/// Default session user.
pub const DEFAULT_USER: &str = "root";
/// Default session password.
pub const DEFAULT_PASSWORD: &str = "root";

/// Errors reported by a [`SessionClient`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    /// A call was made before `open` or after `close`.
    #[snafu(display("Session is not open"))]
    NotOpen,

    /// The remote side rejected the call.
    #[snafu(display("Remote error: {message}"))]
    Remote {
        /// Message returned by the server.
        message: String,
    },
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndpoint {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl Default for SessionEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl SessionEndpoint {
    /// Read `session.*` properties, falling back to the defaults.
    pub fn from_properties(props: &Properties) -> ConfigResult<Self> {
        Ok(Self {
            host: props.string(SESSION_HOST, DEFAULT_HOST),
            port: props.u16(SESSION_PORT, DEFAULT_PORT)?,
            user: props.string(SESSION_USER, DEFAULT_USER),
            password: props.string(SESSION_PASSWORD, DEFAULT_PASSWORD),
        })
    }
}

/// Result of a ranged query: `values[i][j]` is `paths[j]` at `keys[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDataSet {
    /// Keys in ascending order.
    pub keys: Vec<Key>,
    /// Concrete paths returned by the server.
    pub paths: Vec<String>,
    /// One entry per key, aligned to `paths`.
    pub values: Vec<Vec<Option<Value>>>,
}

impl QueryDataSet {
    /// Convert into keyed rows, skipping null cells.
    pub fn into_rows(self) -> Vec<KeyedRow> {
        let paths = self.paths;
        self.keys
            .into_iter()
            .zip(self.values)
            .map(|(key, cells)| {
                let row: SparseRow = paths
                    .iter()
                    .zip(cells)
                    .filter_map(|(path, cell)| cell.map(|v| (path.clone(), v)))
                    .collect();
                KeyedRow::new(key, row)
            })
            .collect()
    }
}

/// Client side of a remote time-series session.
///
/// Ranges are half-open `[start, end)`. A path may end in `*` to select every
/// path under its prefix.
pub trait SessionClient: Send {
    /// Connect and authenticate.
    fn open(&mut self, endpoint: &SessionEndpoint) -> Result<(), SessionError>;

    /// Release the connection.
    fn close(&mut self) -> Result<(), SessionError>;

    /// Insert a row-major batch.
    fn insert_row_records(&mut self, payload: &RowMajorPayload) -> Result<(), SessionError>;

    /// Insert a column-major batch.
    fn insert_column_records(&mut self, payload: &ColumnMajorPayload)
    -> Result<(), SessionError>;

    /// Fetch every value of `paths` with a key in `[start, end)`.
    fn query_data(
        &mut self,
        paths: &[String],
        start: Key,
        end: Key,
    ) -> Result<QueryDataSet, SessionError>;

    /// Delete every value of `path` with a key in `[start, end)`.
    fn delete_data_in_column(&mut self, path: &str, start: Key, end: Key)
    -> Result<(), SessionError>;
}

/// Backend forwarding to a [`SessionClient`].
#[derive(Debug)]
pub struct RemoteBackend<C> {
    client: C,
    open: bool,
}

impl<C: SessionClient> RemoteBackend<C> {
    /// Open `client` against `endpoint`.
    pub fn connect(mut client: C, endpoint: &SessionEndpoint) -> BackendResult<Self> {
        client
            .open(endpoint)
            .context(SessionSnafu { operation: "open" })?;
        debug!(host = %endpoint.host, port = endpoint.port, "session opened");
        Ok(Self { client, open: true })
    }
}

impl<C: SessionClient> Backend for RemoteBackend<C> {
    fn name(&self) -> &'static str {
        "session"
    }

    fn bulk_write(&mut self, payload: BulkPayload) -> BackendResult<()> {
        if payload.is_empty() {
            return Ok(());
        }
        match &payload {
            BulkPayload::Rows(rows) => self
                .client
                .insert_row_records(rows)
                .context(SessionSnafu {
                    operation: "insert_row_records",
                }),
            BulkPayload::Columns(cols) => self
                .client
                .insert_column_records(cols)
                .context(SessionSnafu {
                    operation: "insert_column_records",
                }),
        }
    }

    fn scan(
        &mut self,
        table: &str,
        window: ScanWindow,
        fields: Option<&BTreeSet<String>>,
    ) -> BackendResult<ScanResult> {
        reject_projection(self.name(), fields)?;
        if window.is_empty() {
            return Ok(ScanResult::NotFound);
        }

        let data = self
            .client
            .query_data(&[table_wildcard(table)], window.start, window.end())
            .context(SessionSnafu {
                operation: "query_data",
            })?;
        Ok(ScanResult::from_rows(data.into_rows()))
    }

    fn delete(&mut self, table: &str, key: Key) -> BackendResult<()> {
        self.client
            .delete_data_in_column(&table_wildcard(table), key, key.saturating_add(1))
            .context(SessionSnafu {
                operation: "delete_data_in_column",
            })
    }

    fn teardown(&mut self) -> BackendResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.client
            .close()
            .context(SessionSnafu { operation: "close" })
    }
}
