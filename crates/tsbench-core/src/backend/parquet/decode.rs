//! Shared read path of the file-backed backends: open a file, locate the key
//! and value columns, filter batches by key window, and decode surviving rows
//! into [`KeyedRow`]s.

use std::fs::File;
use std::path::Path;

use arrow::array::{Array, AsArray, BooleanArray, Int64Array, RecordBatch, Scalar};
use arrow::compute::filter_record_batch;
use arrow::compute::kernels::{boolean as boolean_kernels, cmp as cmp_kernels};
use arrow::datatypes::{DataType, Int64Type, Schema};
use arrow::error::ArrowError;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;

use crate::backend::{
    ArrowSnafu, BackendResult, IoSnafu, KeyColumnTypeSnafu, MissingKeyColumnSnafu,
    ParquetReadSnafu, ValueColumnTypeSnafu,
};
use crate::model::{KeyedRow, PATH_SEPARATOR, ScanWindow, SparseRow, Value};

/// Open `path` and read its footer.
pub(crate) fn open_builder(path: &Path) -> BackendResult<ParquetRecordBatchReaderBuilder<File>> {
    let display = path.display().to_string();
    let file = File::open(path).context(IoSnafu {
        path: display.clone(),
    })?;
    ParquetRecordBatchReaderBuilder::try_new(file).context(ParquetReadSnafu { path: display })
}

/// Column positions used to decode a batch.
#[derive(Debug, Clone)]
pub(crate) struct BatchLayout {
    pub(crate) key_idx: usize,
    /// `(column index, path)` of every value column of the scanned table.
    pub(crate) values: Vec<(usize, String)>,
}

/// Locate the key column and the value columns belonging to `table`.
///
/// The key column must be `Int64`; every selected value column must hold
/// raw bytes. Anything else is a schema error rather than a silent skip.
pub(crate) fn layout_for(
    schema: &Schema,
    key_column: &str,
    table: &str,
) -> BackendResult<BatchLayout> {
    let key_idx = schema
        .index_of(key_column)
        .ok()
        .context(MissingKeyColumnSnafu { column: key_column })?;

    let key_type = schema.field(key_idx).data_type();
    ensure!(
        *key_type == DataType::Int64,
        KeyColumnTypeSnafu {
            column: key_column,
            datatype: key_type.clone(),
        }
    );

    let prefix = format!("{table}{PATH_SEPARATOR}");
    let mut values = Vec::new();
    for (idx, field) in schema.fields().iter().enumerate() {
        if idx == key_idx || !field.name().starts_with(&prefix) {
            continue;
        }
        match field.data_type() {
            DataType::Binary | DataType::LargeBinary => values.push((idx, field.name().clone())),
            other => {
                return ValueColumnTypeSnafu {
                    column: field.name().clone(),
                    datatype: other.clone(),
                }
                .fail();
            }
        }
    }

    Ok(BatchLayout { key_idx, values })
}

/// Downcast a key column, failing with the column's actual type.
pub(crate) fn key_array<'a>(column: &'a dyn Array, name: &str) -> BackendResult<&'a Int64Array> {
    column
        .as_primitive_opt::<Int64Type>()
        .context(KeyColumnTypeSnafu {
            column: name,
            datatype: column.data_type().clone(),
        })
}

/// `start <= key < end` mask over a key column. Null keys map to null, which
/// every consumer of the mask treats as "drop".
pub(crate) fn window_mask(keys: &dyn Array, window: ScanWindow) -> Result<BooleanArray, ArrowError> {
    let keys = keys.as_primitive_opt::<Int64Type>().ok_or_else(|| {
        ArrowError::InvalidArgumentError(format!(
            "key column has type {}, expected Int64",
            keys.data_type()
        ))
    })?;

    let start = Scalar::new(Int64Array::from(vec![window.start]));
    let end = Scalar::new(Int64Array::from(vec![window.end()]));

    let ge_mask = cmp_kernels::gt_eq(keys, &start)?;
    let lt_mask = cmp_kernels::lt(keys, &end)?;
    boolean_kernels::and(&ge_mask, &lt_mask)
}

/// Keep only rows whose key lies in `window`.
pub(crate) fn filter_window(
    batch: &RecordBatch,
    key_idx: usize,
    window: ScanWindow,
) -> BackendResult<RecordBatch> {
    let mask = window_mask(batch.column(key_idx).as_ref(), window).context(ArrowSnafu)?;
    filter_record_batch(batch, &mask).context(ArrowSnafu)
}

fn binary_cell(column: &dyn Array, row: usize) -> Option<Value> {
    if column.is_null(row) {
        return None;
    }
    match column.data_type() {
        DataType::Binary => Some(Bytes::copy_from_slice(column.as_binary::<i32>().value(row))),
        DataType::LargeBinary => Some(Bytes::copy_from_slice(column.as_binary::<i64>().value(row))),
        _ => None,
    }
}

/// Append every row of `batch` to `out`. Null value cells are left out of the
/// row. Rows with a null key, or with no value for the table, are skipped.
pub(crate) fn decode_batch(
    batch: &RecordBatch,
    layout: &BatchLayout,
    out: &mut Vec<KeyedRow>,
) -> BackendResult<()> {
    let key_name = batch.schema().field(layout.key_idx).name().clone();
    let keys = key_array(batch.column(layout.key_idx).as_ref(), &key_name)?;

    for row in 0..batch.num_rows() {
        if keys.is_null(row) {
            continue;
        }
        let fields: SparseRow = layout
            .values
            .iter()
            .filter_map(|(idx, path)| {
                binary_cell(batch.column(*idx).as_ref(), row).map(|v| (path.clone(), v))
            })
            .collect();
        if !fields.is_empty() {
            out.push(KeyedRow::new(keys.value(row), fields));
        }
    }
    Ok(())
}
