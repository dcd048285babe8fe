//! In-process [`SessionClient`] backed by a shared ordered map.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{Key, KeyedRow, SparseRow};
use crate::payload::{ColumnMajorPayload, RowMajorPayload};

use super::{
    NotOpenSnafu, QueryDataSet, RemoteSnafu, SessionClient, SessionEndpoint, SessionError,
};

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<Key, SparseRow>,
    insert_calls: usize,
    fail_writes: bool,
}

/// Handle on the data held by a [`MemorySession`].
///
/// Clones share the same state, so a test can keep a handle after the session
/// has been moved into a backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every stored row.
    pub fn rows(&self) -> BTreeMap<Key, SparseRow> {
        self.lock().rows.clone()
    }

    /// Number of stored `(key, path)` points.
    pub fn point_count(&self) -> usize {
        self.lock().rows.values().map(|r| r.len()).sum()
    }

    /// Number of accepted insert calls.
    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }

    /// Make every following insert fail with a remote error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

/// A session that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySession {
    store: MemoryStore,
    open: bool,
}

impl MemorySession {
    /// Fresh, unopened session with an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle on this session's data.
    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.open {
            Ok(())
        } else {
            NotOpenSnafu.fail()
        }
    }

    fn insert(&mut self, rows: Vec<KeyedRow>) -> Result<(), SessionError> {
        self.ensure_open()?;
        let mut state = self.store.lock();
        if state.fail_writes {
            return RemoteSnafu {
                message: "write rejected",
            }
            .fail();
        }
        state.insert_calls += 1;
        for keyed in rows {
            state.rows.entry(keyed.key).or_default().extend(keyed.row);
        }
        Ok(())
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => pattern == path,
    }
}

impl SessionClient for MemorySession {
    fn open(&mut self, _endpoint: &SessionEndpoint) -> Result<(), SessionError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.open = false;
        Ok(())
    }

    fn insert_row_records(&mut self, payload: &RowMajorPayload) -> Result<(), SessionError> {
        self.insert(payload.to_rows())
    }

    fn insert_column_records(
        &mut self,
        payload: &ColumnMajorPayload,
    ) -> Result<(), SessionError> {
        self.insert(payload.to_rows())
    }

    fn query_data(
        &mut self,
        paths: &[String],
        start: Key,
        end: Key,
    ) -> Result<QueryDataSet, SessionError> {
        self.ensure_open()?;
        if end <= start {
            return Ok(QueryDataSet::default());
        }
        let state = self.store.lock();

        let selected: Vec<(Key, &SparseRow)> = state
            .rows
            .range(start..end)
            .filter(|(_, row)| {
                row.keys()
                    .any(|p| paths.iter().any(|pat| path_matches(pat, p)))
            })
            .map(|(k, row)| (*k, row))
            .collect();

        let columns: Vec<String> = selected
            .iter()
            .flat_map(|(_, row)| row.keys())
            .filter(|p| paths.iter().any(|pat| path_matches(pat, p)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect();

        let mut data = QueryDataSet {
            paths: columns,
            ..Default::default()
        };
        for (key, row) in selected {
            data.keys.push(key);
            data.values
                .push(data.paths.iter().map(|p| row.get(p).cloned()).collect());
        }
        Ok(data)
    }

    fn delete_data_in_column(
        &mut self,
        path: &str,
        start: Key,
        end: Key,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        if end <= start {
            return Ok(());
        }
        let mut state = self.store.lock();
        for row in state.rows.range_mut(start..end).map(|(_, row)| row) {
            row.retain(|p, _| !path_matches(path, p));
        }
        state.rows.retain(|_, row| !row.is_empty());
        Ok(())
    }
}
