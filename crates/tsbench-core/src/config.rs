//! Flat string property bag and typed accessors.
//!
//! The harness hands every adapter a `key -> value` map of strings. Typed
//! sections (`GatewayConfig`, `ParquetConfig`, ...) read their settings
//! through the accessors here so that a malformed number or boolean becomes
//! a [`ConfigError`] naming the key and the offending text, which aborts
//! setup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use snafu::prelude::*;

/// Buffered point count that triggers a flush (`0` = flush on every insert).
pub const BUFFER_POINTS: &str = "buffer.points";
/// Materialize column-major payloads instead of row-major ones.
pub const BUFFER_INSERT_BY_COLUMN: &str = "buffer.insert_by_column";
/// Replace every requested scan window with `[0, i64::MAX)`.
pub const SCAN_ALL: &str = "scan.all";

/// Remote session host.
pub const SESSION_HOST: &str = "session.host";
/// Remote session port.
pub const SESSION_PORT: &str = "session.port";
/// Remote session user.
pub const SESSION_USER: &str = "session.user";
/// Remote session password.
pub const SESSION_PASSWORD: &str = "session.password";

/// Where the Parquet backend dumps buffered rows at teardown.
pub const PARQUET_DUMP_PATH: &str = "parquet.path.dump";
/// Which Parquet file the file-backed scans read.
pub const PARQUET_READ_PATH: &str = "parquet.path.read";
/// Maximum rows per Parquet row group.
pub const PARQUET_ROW_GROUP_SIZE: &str = "parquet.size.row_group";
/// Data page size limit in bytes.
pub const PARQUET_PAGE_SIZE: &str = "parquet.size.page";
/// Name of the integer key column in the Parquet file.
pub const PARQUET_KEY_COLUMN: &str = "parquet.key_column";
/// Rows per batch for the dataset scanner.
pub const DATASET_BATCH_SIZE: &str = "parquet.dataset.batch_size";

/// Harness table name.
pub const TABLE: &str = "table";
/// Number of fields per record declared by the harness.
pub const FIELD_COUNT: &str = "fieldcount";
/// Prefix of generated field names (`field0`, `field1`, ...).
pub const FIELD_NAME_PREFIX: &str = "fieldnameprefix";

/// Errors raised while reading configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// A setting that must be an integer could not be parsed.
    #[snafu(display("Failed to parse `{key}` = {value:?} as an integer: {source}"))]
    InvalidInteger {
        /// Property key.
        key: String,
        /// Raw property value.
        value: String,
        /// Underlying parse error.
        source: std::num::ParseIntError,
    },

    /// A setting that must be `true` or `false` could not be parsed.
    #[snafu(display("Failed to parse `{key}` = {value:?} as a boolean: {source}"))]
    InvalidBool {
        /// Property key.
        key: String,
        /// Raw property value.
        value: String,
        /// Underlying parse error.
        source: std::str::ParseBoolError,
    },

    /// A setting has a value outside of its accepted range.
    #[snafu(display("Invalid `{key}` = {value:?}: {reason}"))]
    OutOfRange {
        /// Property key.
        key: String,
        /// Raw property value.
        value: String,
        /// What was expected.
        reason: String,
    },

    /// A properties line is not of the form `key=value`.
    #[snafu(display("Malformed property at line {line}: {text:?} (expected key=value)"))]
    MalformedLine {
        /// One-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },

    /// A properties file could not be read.
    #[snafu(display("Failed to read properties file {}: {source}", path.display()))]
    ReadFile {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result alias for configuration parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A flat `String -> String` property map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    /// Empty property map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder-style [`Properties::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Raw value of `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Raw value of `key`, or `default` when unset.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// String value of `key`, or `default` when unset.
    pub fn string(&self, key: &str, default: &str) -> String {
        self.get_or(key, default).to_string()
    }

    /// Path value of `key`, or `default` when unset.
    pub fn path(&self, key: &str, default: impl AsRef<Path>) -> PathBuf {
        match self.get(key) {
            Some(v) => PathBuf::from(v),
            None => default.as_ref().to_path_buf(),
        }
    }

    /// Unsigned integer value of `key`, or `default` when unset.
    pub fn usize(&self, key: &str, default: usize) -> ConfigResult<usize> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .context(InvalidIntegerSnafu { key, value: raw }),
            None => Ok(default),
        }
    }

    /// Port number value of `key`, or `default` when unset.
    pub fn u16(&self, key: &str, default: u16) -> ConfigResult<u16> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .context(InvalidIntegerSnafu { key, value: raw }),
            None => Ok(default),
        }
    }

    /// Strictly positive integer value of `key`, or `default` when unset.
    pub fn positive(&self, key: &str, default: usize) -> ConfigResult<usize> {
        let value = self.usize(key, default)?;
        ensure!(
            value > 0,
            OutOfRangeSnafu {
                key,
                value: value.to_string(),
                reason: "must be greater than zero",
            }
        );
        Ok(value)
    }

    /// Boolean value of `key` (`true`/`false`, any case), or `default` when unset.
    pub fn bool(&self, key: &str, default: bool) -> ConfigResult<bool> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .to_ascii_lowercase()
                .parse::<bool>()
                .context(InvalidBoolSnafu { key, value: raw }),
            None => Ok(default),
        }
    }

    /// Merge `other` into `self`; keys in `other` win.
    pub fn extend(&mut self, other: Properties) {
        self.values.extend(other.values);
    }

    /// Parse `key=value` lines. Blank lines and lines starting with `#` or
    /// `!` are skipped; whitespace around keys and values is trimmed.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let mut props = Properties::new();
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }
            let (key, value) = trimmed.split_once('=').context(MalformedLineSnafu {
                line: idx + 1,
                text: line,
            })?;
            let key = key.trim();
            ensure!(
                !key.is_empty(),
                MalformedLineSnafu {
                    line: idx + 1,
                    text: line,
                }
            );
            props.set(key, value.trim());
        }
        Ok(props)
    }

    /// Read and parse a properties file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::parse(&text)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}
