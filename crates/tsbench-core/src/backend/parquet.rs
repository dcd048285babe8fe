//! Single-file Parquet backend.
//!
//! Writes never touch disk until teardown: every flushed row is merged into
//! an in-memory accumulator for the lifetime of the backend, and
//! [`Backend::teardown`] dumps the accumulator into one Parquet file. A
//! crash before teardown loses everything written so far.
//!
//! Scans read the configured read path (which defaults to the dump path):
//! - Row groups whose key statistics do not intersect the window are skipped.
//! - The remaining rows go through a pushed-down `[start, end)` predicate on
//!   the key column, so only matching rows are decoded.
//!
//! The dump schema is fixed up front from the declared table and field
//! count: one required `Int64` key column followed by one optional `Binary`
//! column per declared field. A backend that never received a write does not
//! overwrite an existing dump file, so a read-only run leaves its input alone.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ArrowPredicateFn, RowFilter};
use parquet::file::metadata::ParquetMetaData;
use parquet::file::statistics::Statistics;
use snafu::prelude::*;
use tracing::debug;

use crate::backend::{
    ArrowSnafu, Backend, BackendResult, MissingKeyColumnSnafu, ParquetReadSnafu, ScanResult,
    reject_projection,
};
use crate::config::{
    ConfigResult, FIELD_COUNT, FIELD_NAME_PREFIX, PARQUET_DUMP_PATH, PARQUET_KEY_COLUMN,
    PARQUET_PAGE_SIZE, PARQUET_READ_PATH, PARQUET_ROW_GROUP_SIZE, Properties, TABLE,
};
use crate::model::{Key, KeyedRow, ScanWindow, join_path};
use crate::payload::BulkPayload;
use crate::write_buffer::WriteBuffer;

pub(crate) mod decode;
mod dump;

/// Default dump and read path.
pub const DEFAULT_PATH: &str = "dump.parquet";
/// Default maximum rows per row group.
pub const DEFAULT_ROW_GROUP_SIZE: usize = 1_048_567;
/// Default data page size limit in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 8_388_608;
/// Default name of the key column.
pub const DEFAULT_KEY_COLUMN: &str = "*";
/// Default harness table.
pub const DEFAULT_TABLE: &str = "usertable";
/// Default number of declared fields.
pub const DEFAULT_FIELD_COUNT: usize = 10;
/// Default field name prefix.
pub const DEFAULT_FIELD_PREFIX: &str = "field";

/// Settings of the file-backed backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetConfig {
    /// File written at teardown.
    pub dump_path: PathBuf,
    /// File read by scans.
    pub read_path: PathBuf,
    /// Maximum rows per row group.
    pub row_group_size: usize,
    /// Data page size limit in bytes.
    pub page_size: usize,
    /// Name of the key column.
    pub key_column: String,
    /// Declared table.
    pub table: String,
    /// Declared number of fields.
    pub field_count: usize,
    /// Field name prefix (`field` gives `field0`, `field1`, ...).
    pub field_prefix: String,
}

impl Default for ParquetConfig {
    fn default() -> Self {
        Self {
            dump_path: PathBuf::from(DEFAULT_PATH),
            read_path: PathBuf::from(DEFAULT_PATH),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            table: DEFAULT_TABLE.to_string(),
            field_count: DEFAULT_FIELD_COUNT,
            field_prefix: DEFAULT_FIELD_PREFIX.to_string(),
        }
    }
}

impl ParquetConfig {
    /// Read `parquet.*` and harness properties, falling back to the defaults.
    ///
    /// The read path defaults to the dump path so a load followed by a run
    /// reads back what was written.
    pub fn from_properties(props: &Properties) -> ConfigResult<Self> {
        let dump_path = props.path(PARQUET_DUMP_PATH, DEFAULT_PATH);
        let read_path = props.path(PARQUET_READ_PATH, &dump_path);
        Ok(Self {
            read_path,
            dump_path,
            row_group_size: props.positive(PARQUET_ROW_GROUP_SIZE, DEFAULT_ROW_GROUP_SIZE)?,
            page_size: props.positive(PARQUET_PAGE_SIZE, DEFAULT_PAGE_SIZE)?,
            key_column: props.string(PARQUET_KEY_COLUMN, DEFAULT_KEY_COLUMN),
            table: props.string(TABLE, DEFAULT_TABLE),
            field_count: props.usize(FIELD_COUNT, DEFAULT_FIELD_COUNT)?,
            field_prefix: props.string(FIELD_NAME_PREFIX, DEFAULT_FIELD_PREFIX),
        })
    }

    /// Builder-style override of both paths.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.read_path = path.clone();
        self.dump_path = path;
        self
    }

    /// Value columns of the dump schema, in declaration order.
    pub fn declared_paths(&self) -> Vec<String> {
        (0..self.field_count)
            .map(|i| join_path(&self.table, &format!("{}{i}", self.field_prefix)))
            .collect()
    }
}

/// Parquet file backend with a whole-lifetime write accumulator.
#[derive(Debug)]
pub struct ParquetBackend {
    config: ParquetConfig,
    rows: WriteBuffer,
    received_writes: bool,
    dumped: bool,
}

impl ParquetBackend {
    /// Backend with an empty accumulator.
    pub fn new(config: ParquetConfig) -> Self {
        Self {
            config,
            rows: WriteBuffer::new(),
            received_writes: false,
            dumped: false,
        }
    }

    /// Backend configured from properties.
    pub fn from_properties(props: &Properties) -> ConfigResult<Self> {
        Ok(Self::new(ParquetConfig::from_properties(props)?))
    }

    /// Active settings.
    pub fn config(&self) -> &ParquetConfig {
        &self.config
    }

    /// Number of points waiting for the teardown dump.
    pub fn pending_points(&self) -> usize {
        self.rows.point_count()
    }

    /// Merge a payload into the accumulator.
    pub(crate) fn accumulate(&mut self, payload: &BulkPayload) {
        self.received_writes = true;
        for keyed in payload.to_rows() {
            self.rows.add_row(keyed.key, keyed.row);
        }
    }

    /// Write the accumulator to the dump path. Runs at most once.
    pub(crate) fn dump(&mut self) -> BackendResult<()> {
        if self.dumped {
            return Ok(());
        }
        self.dumped = true;
        if !self.received_writes && self.config.dump_path.exists() {
            debug!(
                path = %self.config.dump_path.display(),
                "no writes received, keeping existing dump file"
            );
            return Ok(());
        }
        let snapshot = self.rows.drain();
        dump::write_dump(&self.config, snapshot)
    }
}

impl Backend for ParquetBackend {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn bulk_write(&mut self, payload: BulkPayload) -> BackendResult<()> {
        self.accumulate(&payload);
        Ok(())
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
        let rows = read_window(&self.config.read_path, &self.config.key_column, table, window)?;
        Ok(ScanResult::from_rows(rows))
    }

    fn teardown(&mut self) -> BackendResult<()> {
        self.dump()
    }
}

/// Row groups whose key statistics intersect `window`. Groups without usable
/// statistics are always kept.
fn prune_row_groups(
    metadata: &ParquetMetaData,
    key_leaf: usize,
    window: ScanWindow,
) -> Vec<usize> {
    metadata
        .row_groups()
        .iter()
        .enumerate()
        .filter(|(_, rg)| match rg.column(key_leaf).statistics() {
            Some(Statistics::Int64(stats)) => match (stats.min_opt(), stats.max_opt()) {
                // closed [min, max] intersects half-open [start, end)
                (Some(min), Some(max)) => *max >= window.start && *min < window.end(),
                _ => true,
            },
            _ => true,
        })
        .map(|(idx, _)| idx)
        .collect()
}

fn read_window(
    path: &Path,
    key_column: &str,
    table: &str,
    window: ScanWindow,
) -> BackendResult<Vec<KeyedRow>> {
    let builder = decode::open_builder(path)?;
    let layout = decode::layout_for(builder.schema(), key_column, table)?;

    let key_leaf = builder
        .parquet_schema()
        .columns()
        .iter()
        .position(|c| c.name() == key_column)
        .context(MissingKeyColumnSnafu { column: key_column })?;

    let row_groups = prune_row_groups(builder.metadata(), key_leaf, window);
    debug!(
        path = %path.display(),
        kept = row_groups.len(),
        total = builder.metadata().num_row_groups(),
        "pruned row groups"
    );

    let mask = ProjectionMask::leaves(builder.parquet_schema(), [key_leaf]);
    let predicate = ArrowPredicateFn::new(mask, move |batch| {
        decode::window_mask(batch.column(0).as_ref(), window)
    });

    let reader = builder
        .with_row_groups(row_groups)
        .with_row_filter(RowFilter::new(vec![Box::new(predicate)]))
        .build()
        .context(ParquetReadSnafu {
            path: path.display().to_string(),
        })?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.context(ArrowSnafu)?;
        decode::decode_batch(&batch, &layout, &mut out)?;
    }
    Ok(out)
}

/// Keys present in a Parquet file, in file order.
pub fn read_keys(path: &Path, key_column: &str) -> BackendResult<Vec<Key>> {
    let builder = decode::open_builder(path)?;
    let key_leaf = builder
        .parquet_schema()
        .columns()
        .iter()
        .position(|c| c.name() == key_column)
        .context(MissingKeyColumnSnafu { column: key_column })?;
    let mask = ProjectionMask::leaves(builder.parquet_schema(), [key_leaf]);
    let reader = builder
        .with_projection(mask)
        .build()
        .context(ParquetReadSnafu {
            path: path.display().to_string(),
        })?;

    let mut keys = Vec::new();
    for batch in reader {
        let batch = batch.context(ArrowSnafu)?;
        let column = decode::key_array(batch.column(0).as_ref(), key_column)?;
        keys.extend(column.iter().flatten());
    }
    Ok(keys)
}
