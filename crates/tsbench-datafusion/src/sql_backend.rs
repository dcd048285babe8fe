//! Range scans through DataFusion SQL.
//!
//! The backend shares the write path of the core Parquet backend: flushed
//! rows are accumulated in memory and dumped to one file at teardown. Scans
//! register that file as the `source` table and run
//!
//! ```sql
//! SELECT * FROM source WHERE "<key>" >= <start> AND "<key>" < <end> ORDER BY "<key>"
//! ```
//!
//! on a private current-thread runtime, so the [`Backend`] surface stays
//! synchronous. Value columns are cast to `Utf8` and the text bytes are
//! returned as the stored values.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use arrow::array::{Array, AsArray, RecordBatch, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int64Type};
use bytes::Bytes;
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use snafu::prelude::*;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;
use tsbench_core::backend::parquet::{ParquetBackend, ParquetConfig};
use tsbench_core::backend::{BackendResult, reject_projection};
use tsbench_core::config::ConfigResult;
use tsbench_core::model::PATH_SEPARATOR;
use tsbench_core::{Backend, BulkPayload, KeyedRow, Properties, ScanResult, ScanWindow, SparseRow};

use crate::error::{
    ArrowSnafu, ConfigSnafu, DataFusionSnafu, KeyColumnTypeSnafu, MissingFileSnafu,
    MissingKeyColumnSnafu, NonUtf8PathSnafu, RuntimeSnafu, SqlResult,
};

/// Create a fresh session for every scan instead of sharing one.
pub const CLOSED_PER_READ: &str = "parquet.sql.closed_per_read";
/// Register the file once per session instead of before every scan.
pub const ENABLE_OBJECT_CACHE: &str = "parquet.sql.enable_object_cache";
/// Materialize the window into a table before reading it back.
pub const LOAD_ONLY: &str = "parquet.sql.load_only";

const SOURCE_TABLE: &str = "source";
const LOADED_TABLE: &str = "loaded";

/// Session and statement switches of the SQL backend. All default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlOptions {
    /// No shared session: every scan builds and drops its own.
    pub closed_per_read: bool,
    /// Keep the file registered between scans of a shared session.
    pub enable_object_cache: bool,
    /// Run `DROP TABLE` + `CREATE TABLE AS` before reading the window back.
    pub load_only: bool,
}

impl SqlOptions {
    /// Read the `parquet.sql.*` switches.
    pub fn from_properties(props: &Properties) -> ConfigResult<Self> {
        Ok(Self {
            closed_per_read: props.bool(CLOSED_PER_READ, false)?,
            enable_object_cache: props.bool(ENABLE_OBJECT_CACHE, false)?,
            load_only: props.bool(LOAD_ONLY, false)?,
        })
    }
}

/// Full settings of the SQL backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlConfig {
    /// File layout shared with the Parquet backend.
    pub file: ParquetConfig,
    /// Session and statement switches.
    pub options: SqlOptions,
}

impl SqlConfig {
    /// Read the file settings and the `parquet.sql.*` switches.
    pub fn from_properties(props: &Properties) -> ConfigResult<Self> {
        Ok(Self {
            file: ParquetConfig::from_properties(props)?,
            options: SqlOptions::from_properties(props)?,
        })
    }
}

/// [`Backend`] answering scans with DataFusion SQL.
pub struct SqlBackend {
    file: ParquetBackend,
    options: SqlOptions,
    runtime: Runtime,
    shared: Option<SessionContext>,
}

impl fmt::Debug for SqlBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlBackend")
            .field("file", &self.file)
            .field("options", &self.options)
            .field("shared_session", &self.shared.is_some())
            .finish_non_exhaustive()
    }
}

impl SqlBackend {
    /// Backend with its own current-thread runtime.
    pub fn new(config: SqlConfig) -> SqlResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context(RuntimeSnafu)?;
        Ok(Self {
            file: ParquetBackend::new(config.file),
            options: config.options,
            runtime,
            shared: None,
        })
    }

    /// Backend configured from properties.
    pub fn from_properties(props: &Properties) -> SqlResult<Self> {
        let config = SqlConfig::from_properties(props).context(ConfigSnafu)?;
        Self::new(config)
    }

    /// Active switches.
    pub fn options(&self) -> SqlOptions {
        self.options
    }

    /// File layout shared with the Parquet backend.
    pub fn file_config(&self) -> &ParquetConfig {
        self.file.config()
    }

    /// True while a shared session is held.
    pub fn has_shared_session(&self) -> bool {
        self.shared.is_some()
    }

    fn session(&mut self) -> SessionContext {
        if self.options.closed_per_read {
            return SessionContext::new();
        }
        self.shared.get_or_insert_with(SessionContext::new).clone()
    }

    fn query_window(&mut self, table: &str, window: ScanWindow) -> SqlResult<Vec<KeyedRow>> {
        let config = self.file.config();
        let path = config.read_path.clone();
        let key_column = config.key_column.clone();
        ensure!(path.is_file(), MissingFileSnafu { path: path.clone() });
        let location = path
            .to_str()
            .context(NonUtf8PathSnafu { path: path.clone() })?
            .to_string();

        let statements = window_statements(&key_column, window, self.options.load_only);
        let reuse = self.options.enable_object_cache;
        let ctx = self.session();

        let batches = self.runtime.block_on(async {
            register_source(&ctx, &location, &path, reuse).await?;
            run_statements(&ctx, &statements).await
        })?;
        decode_rows(&batches, &key_column, table)
    }
}

impl Backend for SqlBackend {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn bulk_write(&mut self, payload: BulkPayload) -> BackendResult<()> {
        self.file.bulk_write(payload)
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
        let rows = self.query_window(table, window)?;
        Ok(ScanResult::from_rows(rows))
    }

    fn teardown(&mut self) -> BackendResult<()> {
        self.shared = None;
        self.file.teardown()
    }
}

fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// `i64::MIN` has no positive counterpart, so it cannot be written as a
/// negated literal.
fn int_literal(value: i64) -> String {
    if value == i64::MIN {
        format!("({} - 1)", i64::MIN + 1)
    } else {
        value.to_string()
    }
}

/// Statements run for one scan. The rows of the last one are the result.
fn window_statements(key_column: &str, window: ScanWindow, load_only: bool) -> Vec<String> {
    let key = quote_identifier(key_column);
    let select = format!(
        "SELECT * FROM {SOURCE_TABLE} WHERE {key} >= {} AND {key} < {} ORDER BY {key}",
        int_literal(window.start),
        int_literal(window.end()),
    );
    if !load_only {
        return vec![select];
    }
    vec![
        format!("DROP TABLE IF EXISTS {LOADED_TABLE}"),
        format!("CREATE TABLE {LOADED_TABLE} AS {select}"),
        format!("SELECT * FROM {LOADED_TABLE} ORDER BY {key}"),
    ]
}

async fn register_source(
    ctx: &SessionContext,
    location: &str,
    path: &Path,
    reuse: bool,
) -> SqlResult<()> {
    let step = || DataFusionSnafu {
        statement: format!("register {SOURCE_TABLE} from {location}"),
    };
    if reuse && ctx.table_exist(SOURCE_TABLE).with_context(|_| step())? {
        return Ok(());
    }
    ctx.deregister_table(SOURCE_TABLE)
        .with_context(|_| step())?;

    // the listing table filters files by extension, so accept whatever the
    // configured file uses
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let mut options = ParquetReadOptions::default();
    options.file_extension = &extension;

    ctx.register_parquet(SOURCE_TABLE, location, options)
        .await
        .with_context(|_| step())?;
    debug!(location, "registered parquet source");
    Ok(())
}

async fn run_statements(ctx: &SessionContext, statements: &[String]) -> SqlResult<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    for sql in statements {
        let df = ctx
            .sql(sql)
            .await
            .context(DataFusionSnafu { statement: sql })?;
        batches = df
            .collect()
            .await
            .context(DataFusionSnafu { statement: sql })?;
    }
    Ok(batches)
}

/// Rebuild keyed rows from result batches. Only columns of `table` are kept;
/// null keys are skipped and null cells are left out of the row.
fn decode_rows(batches: &[RecordBatch], key_column: &str, table: &str) -> SqlResult<Vec<KeyedRow>> {
    let prefix = format!("{table}{PATH_SEPARATOR}");
    let mut rows = Vec::new();

    for batch in batches {
        let schema = batch.schema();
        let key_idx = schema
            .index_of(key_column)
            .ok()
            .context(MissingKeyColumnSnafu { column: key_column })?;
        let key_col = batch.column(key_idx);
        let keys = key_col
            .as_primitive_opt::<Int64Type>()
            .context(KeyColumnTypeSnafu {
                column: key_column,
                datatype: key_col.data_type().clone(),
            })?;

        let mut values: Vec<(&str, StringArray)> = Vec::new();
        for (idx, field) in schema.fields().iter().enumerate() {
            if idx == key_idx || !field.name().starts_with(&prefix) {
                continue;
            }
            let text = cast(batch.column(idx), &DataType::Utf8).context(ArrowSnafu)?;
            values.push((field.name().as_str(), text.as_string::<i32>().clone()));
        }

        for row in 0..batch.num_rows() {
            if keys.is_null(row) {
                continue;
            }
            let fields: SparseRow = values
                .iter()
                .filter(|(_, column)| column.is_valid(row))
                .map(|(path, column)| {
                    (
                        (*path).to_string(),
                        Bytes::copy_from_slice(column.value(row).as_bytes()),
                    )
                })
                .collect();
            if !fields.is_empty() {
                rows.push(KeyedRow::new(keys.value(row), fields));
            }
        }
    }
    Ok(rows)
}
