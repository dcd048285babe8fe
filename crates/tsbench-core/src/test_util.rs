use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::model::{Key, Value};

pub(crate) type TestResult = Result<(), Box<dyn std::error::Error>>;

/// `(key, "v{key}")` for every key in `keys`.
pub(crate) fn sample_rows(keys: Range<Key>) -> Vec<(Key, Value)> {
    keys.map(|k| (k, Bytes::from(format!("v{k}")))).collect()
}

/// Write a two-column file (`Int64` key, `Binary` value) with at most
/// `row_group_size` rows per row group.
pub(crate) fn write_key_value_parquet(
    path: &Path,
    key_column: &str,
    value_column: &str,
    rows: &[(Key, Value)],
    row_group_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new(key_column, DataType::Int64, false),
        Field::new(value_column, DataType::Binary, true),
    ]));

    let keys: Int64Array = rows.iter().map(|(k, _)| *k).collect();
    let values = BinaryArray::from_iter_values(rows.iter().map(|(_, v)| v.clone()));
    let columns: Vec<ArrayRef> = vec![Arc::new(keys), Arc::new(values)];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let props = WriterProperties::builder()
        .set_max_row_group_size(row_group_size)
        .build();
    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Write a file whose key column holds strings instead of integers.
pub(crate) fn write_string_key_parquet(
    path: &Path,
    key_column: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(key_column, DataType::Utf8, false),
        Field::new("t.f0", DataType::Binary, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec!["user1"])),
        Arc::new(BinaryArray::from(vec![Some(b"v".as_slice())])),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
