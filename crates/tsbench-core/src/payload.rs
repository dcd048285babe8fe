//! Bulk payloads handed from the write buffer to a backend.
//!
//! Both layouts share one ordered key list and one ordered path list. A
//! missing `(key, path)` cell is `None`. The two layouts are transpositions
//! of each other and convert losslessly in both directions.

use std::collections::HashMap;

use crate::model::{Key, KeyedRow, SparseRow, Value};

/// Which layout the gateway materializes at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadLayout {
    /// One value array per key.
    #[default]
    RowMajor,
    /// One value array per path.
    ColumnMajor,
}

/// Row-major payload: `rows[i][j]` is the value of `paths[j]` at `keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowMajorPayload {
    /// Keys in ascending order.
    pub keys: Vec<Key>,
    /// Union of every path seen in the payload, in stable order.
    pub paths: Vec<String>,
    /// One entry per key, each aligned to `paths`.
    pub rows: Vec<Vec<Option<Value>>>,
}

/// Column-major payload: `columns[j][i]` is the value of `paths[j]` at `keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMajorPayload {
    /// Keys in ascending order.
    pub keys: Vec<Key>,
    /// Union of every path seen in the payload, in stable order.
    pub paths: Vec<String>,
    /// One entry per path, each aligned to `keys`.
    pub columns: Vec<Vec<Option<Value>>>,
}

fn rebuild_rows<'a>(
    keys: &[Key],
    paths: &[String],
    cell: impl Fn(usize, usize) -> Option<&'a Value>,
) -> Vec<KeyedRow> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| {
            let row: SparseRow = paths
                .iter()
                .enumerate()
                .filter_map(|(j, path)| cell(i, j).map(|v| (path.clone(), v.clone())))
                .collect();
            KeyedRow::new(*key, row)
        })
        .collect()
}

pub(crate) fn path_index(paths: &[String]) -> HashMap<&str, usize> {
    paths
        .iter()
        .enumerate()
        .map(|(idx, p)| (p.as_str(), idx))
        .collect()
}

impl RowMajorPayload {
    /// Transpose into the column-major layout.
    pub fn to_column_major(&self) -> ColumnMajorPayload {
        let mut columns = vec![Vec::with_capacity(self.keys.len()); self.paths.len()];
        for row in &self.rows {
            for (j, cell) in row.iter().enumerate() {
                columns[j].push(cell.clone());
            }
        }
        ColumnMajorPayload {
            keys: self.keys.clone(),
            paths: self.paths.clone(),
            columns,
        }
    }

    /// Rebuild the sparse rows, dropping `None` cells.
    pub fn to_rows(&self) -> Vec<KeyedRow> {
        rebuild_rows(&self.keys, &self.paths, |i, j| self.rows[i][j].as_ref())
    }

    /// Number of present `(key, path)` cells.
    pub fn point_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().filter(|c| c.is_some()).count())
            .sum()
    }
}

impl ColumnMajorPayload {
    /// Transpose into the row-major layout.
    pub fn to_row_major(&self) -> RowMajorPayload {
        let rows = (0..self.keys.len())
            .map(|i| self.columns.iter().map(|col| col[i].clone()).collect())
            .collect();
        RowMajorPayload {
            keys: self.keys.clone(),
            paths: self.paths.clone(),
            rows,
        }
    }

    /// Rebuild the sparse rows, dropping `None` cells.
    pub fn to_rows(&self) -> Vec<KeyedRow> {
        rebuild_rows(&self.keys, &self.paths, |i, j| self.columns[j][i].as_ref())
    }

    /// Number of present `(key, path)` cells.
    pub fn point_count(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.iter().filter(|v| v.is_some()).count())
            .sum()
    }
}

/// A drained buffer in one of the two layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkPayload {
    /// Row-major layout.
    Rows(RowMajorPayload),
    /// Column-major layout.
    Columns(ColumnMajorPayload),
}

impl BulkPayload {
    /// Layout of this payload.
    pub fn layout(&self) -> PayloadLayout {
        match self {
            BulkPayload::Rows(_) => PayloadLayout::RowMajor,
            BulkPayload::Columns(_) => PayloadLayout::ColumnMajor,
        }
    }

    /// Keys covered by the payload, ascending.
    pub fn keys(&self) -> &[Key] {
        match self {
            BulkPayload::Rows(p) => &p.keys,
            BulkPayload::Columns(p) => &p.keys,
        }
    }

    /// Paths covered by the payload.
    pub fn paths(&self) -> &[String] {
        match self {
            BulkPayload::Rows(p) => &p.paths,
            BulkPayload::Columns(p) => &p.paths,
        }
    }

    /// True when the payload carries no keys.
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Number of present `(key, path)` cells.
    pub fn point_count(&self) -> usize {
        match self {
            BulkPayload::Rows(p) => p.point_count(),
            BulkPayload::Columns(p) => p.point_count(),
        }
    }

    /// Rebuild the sparse rows regardless of layout.
    pub fn to_rows(&self) -> Vec<KeyedRow> {
        match self {
            BulkPayload::Rows(p) => p.to_rows(),
            BulkPayload::Columns(p) => p.to_rows(),
        }
    }
}
