//! In-memory buffer of sparse writes keyed by timestamp.
//!
//! The buffer keeps one [`SparseRow`] per key and a running count of
//! buffered `(key, path)` points. The count always equals the sum of the
//! per-row field counts; both are reset together by [`WriteBuffer::drain`].
//!
//! Mutation requires `&mut self`, so the owner of the buffer is the single
//! writer and a drain can never interleave with an add.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Key, KeyedRow, SparseRow, Value};
use crate::payload::{
    BulkPayload, ColumnMajorPayload, PayloadLayout, RowMajorPayload, path_index,
};

/// Accumulates sparse per-key writes until they are drained.
#[derive(Debug, Default, Clone)]
pub struct WriteBuffer {
    rows: BTreeMap<Key, SparseRow>,
    points: usize,
}

impl WriteBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite one field of one row.
    ///
    /// Returns `true` when the path was new for `key` (the point count grew),
    /// `false` when an existing value was overwritten in place.
    pub fn add(&mut self, key: Key, path: impl Into<String>, value: Value) -> bool {
        let row = self.rows.entry(key).or_default();
        let is_new = row.insert(path.into(), value).is_none();
        if is_new {
            self.points += 1;
        }
        is_new
    }

    /// Merge every field of `row` into the row at `key`.
    ///
    /// Returns the number of new points.
    pub fn add_row(&mut self, key: Key, row: SparseRow) -> usize {
        let mut added = 0;
        for (path, value) in row {
            if self.add(key, path, value) {
                added += 1;
            }
        }
        added
    }

    /// Total buffered `(key, path)` points.
    pub fn point_count(&self) -> usize {
        self.points
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look at the row buffered for `key`.
    pub fn row(&self, key: Key) -> Option<&SparseRow> {
        self.rows.get(&key)
    }

    /// Take every buffered row and reset the buffer to empty.
    pub fn drain(&mut self) -> BufferSnapshot {
        let rows = std::mem::take(&mut self.rows);
        let points = std::mem::take(&mut self.points);
        BufferSnapshot { rows, points }
    }
}

/// Rows taken out of a [`WriteBuffer`] by a drain, in ascending key order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferSnapshot {
    rows: BTreeMap<Key, SparseRow>,
    points: usize,
}

impl BufferSnapshot {
    /// Number of rows in the snapshot.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the snapshot has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of `(key, path)` points in the snapshot.
    pub fn point_count(&self) -> usize {
        self.points
    }

    /// Iterate rows in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (Key, &SparseRow)> {
        self.rows.iter().map(|(k, row)| (*k, row))
    }

    /// Iterate every `(key, path, value)` triple in key then path order.
    pub fn points(&self) -> impl Iterator<Item = (Key, &str, &Value)> {
        self.rows
            .iter()
            .flat_map(|(k, row)| row.iter().map(move |(p, v)| (*k, p.as_str(), v)))
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Vec<Key> {
        self.rows.keys().copied().collect()
    }

    /// Sorted union of every path present in any row.
    pub fn paths(&self) -> Vec<String> {
        self.rows
            .values()
            .flat_map(|row| row.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Consume the snapshot into keyed rows.
    pub fn into_rows(self) -> Vec<KeyedRow> {
        self.rows
            .into_iter()
            .map(|(key, row)| KeyedRow::new(key, row))
            .collect()
    }

    /// Build the row-major payload.
    pub fn materialize_row_major(&self) -> RowMajorPayload {
        let paths = self.paths();
        let index = path_index(&paths);
        let rows = self
            .rows
            .values()
            .map(|row| {
                let mut cells = vec![None; paths.len()];
                for (path, value) in row {
                    cells[index[path.as_str()]] = Some(value.clone());
                }
                cells
            })
            .collect();

        RowMajorPayload {
            keys: self.keys(),
            paths,
            rows,
        }
    }

    /// Build the column-major payload.
    pub fn materialize_column_major(&self) -> ColumnMajorPayload {
        let paths = self.paths();
        let index = path_index(&paths);
        let mut columns = vec![vec![None; self.rows.len()]; paths.len()];
        for (i, row) in self.rows.values().enumerate() {
            for (path, value) in row {
                columns[index[path.as_str()]][i] = Some(value.clone());
            }
        }

        ColumnMajorPayload {
            keys: self.keys(),
            paths,
            columns,
        }
    }

    /// Build the payload in the requested layout.
    pub fn materialize(&self, layout: PayloadLayout) -> BulkPayload {
        match layout {
            PayloadLayout::RowMajor => BulkPayload::Rows(self.materialize_row_major()),
            PayloadLayout::ColumnMajor => BulkPayload::Columns(self.materialize_column_major()),
        }
    }
}

impl IntoIterator for BufferSnapshot {
    type Item = (Key, SparseRow);
    type IntoIter = std::collections::btree_map::IntoIter<Key, SparseRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
