//! Addressing scheme shared by the buffer, the payloads and every backend.
//!
//! A record is addressed by a signed 64-bit [`Key`] (the timestamp) and a
//! path of the form `table.field`. Values are opaque bytes; nothing in this
//! crate interprets their content.

use std::collections::BTreeMap;

use bytes::Bytes;
use snafu::prelude::*;

/// Timestamp key of a record. Ordering is plain integer ordering.
pub type Key = i64;

/// Opaque value payload.
pub type Value = Bytes;

/// One buffered or decoded record: `path -> value` for a single key.
///
/// A `BTreeMap` keeps field order deterministic for decoding and payload
/// construction.
pub type SparseRow = BTreeMap<String, Value>;

/// Separator between the table name and the field name in a path.
pub const PATH_SEPARATOR: char = '.';

/// Number of leading characters of a harness key that precede the numeric
/// timestamp (for example `user` in `user1234`).
pub const KEY_PREFIX_LEN: usize = 4;

/// Join a table name and a field name into a path (`table.field`).
pub fn join_path(table: &str, field: &str) -> String {
    let mut path = String::with_capacity(table.len() + field.len() + 1);
    path.push_str(table);
    path.push(PATH_SEPARATOR);
    path.push_str(field);
    path
}

/// Recover the field name from a path: everything after the first separator.
///
/// A path without a separator is returned unchanged.
pub fn field_name(path: &str) -> &str {
    match path.find(PATH_SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Wildcard path selecting every field of `table`.
pub fn table_wildcard(table: &str) -> String {
    join_path(table, "*")
}

/// Errors raised when a harness key cannot be mapped onto a [`Key`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum KeyParseError {
    /// The key is shorter than the fixed prefix.
    #[snafu(display("Key {key:?} is shorter than the {KEY_PREFIX_LEN}-character prefix"))]
    TooShort {
        /// The offending harness key.
        key: String,
    },

    /// The part after the prefix is not a signed 64-bit integer.
    #[snafu(display("Key {key:?} does not end in a 64-bit integer: {source}"))]
    NotNumeric {
        /// The offending harness key.
        key: String,
        /// Underlying integer parse error.
        source: std::num::ParseIntError,
    },
}

/// Parse a harness key by skipping the fixed prefix and reading the
/// remainder as an integer timestamp.
pub fn parse_key(key: &str) -> Result<Key, KeyParseError> {
    let digits = key.get(KEY_PREFIX_LEN..).context(TooShortSnafu { key })?;
    digits.parse::<Key>().context(NotNumericSnafu { key })
}

/// A half-open key range `[start, start + interval)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    /// Inclusive lower bound.
    pub start: Key,
    /// Width of the window. Values `<= 0` describe an empty window.
    pub interval: i64,
}

impl ScanWindow {
    /// Window covering `[start, start + interval)`.
    pub fn new(start: Key, interval: i64) -> Self {
        Self { start, interval }
    }

    /// Window covering exactly one key.
    pub fn point(key: Key) -> Self {
        Self::new(key, 1)
    }

    /// Window covering `[0, i64::MAX)`.
    pub fn all() -> Self {
        Self::new(0, i64::MAX)
    }

    /// Exclusive upper bound. Saturates at `i64::MAX` instead of wrapping.
    pub fn end(&self) -> Key {
        self.start.saturating_add(self.interval)
    }

    /// True when the window cannot contain any key.
    pub fn is_empty(&self) -> bool {
        self.end() <= self.start
    }

    /// Half-open membership test.
    pub fn contains(&self, key: Key) -> bool {
        key >= self.start && key < self.end()
    }
}

/// A decoded record together with its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRow {
    /// Record key.
    pub key: Key,
    /// Record fields, keyed by path (or by field name once the gateway has
    /// stripped the table prefix).
    pub row: SparseRow,
}

impl KeyedRow {
    /// Build a keyed row.
    pub fn new(key: Key, row: SparseRow) -> Self {
        Self { key, row }
    }
}
