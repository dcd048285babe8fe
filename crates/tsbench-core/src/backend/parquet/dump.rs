//! Teardown dump of the Parquet accumulator.

use std::collections::HashSet;
use std::fs::File;
use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryBuilder, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use tracing::info;

use crate::backend::{
    ArrowSnafu, BackendResult, IoSnafu, ParquetWriteSnafu, UndeclaredFieldSnafu,
};
use crate::model::{Key, SparseRow};
use crate::write_buffer::BufferSnapshot;

use super::ParquetConfig;

/// Rows per record batch handed to the writer.
const DUMP_BATCH_ROWS: usize = 8192;

fn dump_schema(config: &ParquetConfig, paths: &[String]) -> SchemaRef {
    let mut fields = Vec::with_capacity(paths.len() + 1);
    fields.push(Field::new(&config.key_column, DataType::Int64, false));
    fields.extend(paths.iter().map(|p| Field::new(p, DataType::Binary, true)));
    Arc::new(Schema::new(fields))
}

fn build_batch(
    schema: &SchemaRef,
    paths: &[String],
    rows: &[(Key, &SparseRow)],
) -> BackendResult<RecordBatch> {
    let keys: Int64Array = rows.iter().map(|(k, _)| *k).collect();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(paths.len() + 1);
    columns.push(Arc::new(keys));

    for path in paths {
        let mut builder = BinaryBuilder::with_capacity(rows.len(), 0);
        for (_, row) in rows {
            match row.get(path) {
                Some(value) => builder.append_value(value),
                None => builder.append_null(),
            }
        }
        columns.push(Arc::new(builder.finish()));
    }

    RecordBatch::try_new(schema.clone(), columns).context(ArrowSnafu)
}

/// Write `snapshot` to `config.dump_path`.
///
/// The schema is the declared one even when some declared fields were never
/// written; an empty snapshot still produces a valid zero-row file.
pub(crate) fn write_dump(config: &ParquetConfig, snapshot: BufferSnapshot) -> BackendResult<()> {
    let paths = config.declared_paths();
    let declared: HashSet<&str> = paths.iter().map(String::as_str).collect();
    if let Some(path) = snapshot
        .paths()
        .into_iter()
        .find(|p| !declared.contains(p.as_str()))
    {
        return UndeclaredFieldSnafu { path }.fail();
    }

    let target = config.dump_path.display().to_string();
    if let Some(parent) = config.dump_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context(IoSnafu {
                path: parent.display().to_string(),
            })?;
        }
    }

    let file = File::create(&config.dump_path).context(IoSnafu {
        path: target.clone(),
    })?;
    let props = WriterProperties::builder()
        .set_max_row_group_size(config.row_group_size)
        .set_data_page_size_limit(config.page_size)
        .build();

    let schema = dump_schema(config, &paths);
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
        .context(ParquetWriteSnafu { path: &target })?;

    let rows: Vec<(Key, &SparseRow)> = snapshot.iter().collect();
    for chunk in rows.chunks(DUMP_BATCH_ROWS) {
        let batch = build_batch(&schema, &paths, chunk)?;
        writer
            .write(&batch)
            .context(ParquetWriteSnafu { path: &target })?;
    }
    writer
        .close()
        .context(ParquetWriteSnafu { path: &target })?;

    info!(
        path = %target,
        rows = rows.len(),
        points = snapshot.point_count(),
        "parquet dump written"
    );
    Ok(())
}
