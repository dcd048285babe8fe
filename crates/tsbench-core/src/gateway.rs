//! Harness-facing gateway.
//!
//! The gateway speaks the benchmark harness's vocabulary (string keys, table
//! names, field maps, four-valued statuses) and translates it into the
//! `(key, table.field)` addressing used by the buffer and the backends:
//!
//! - `insert`/`update` parse the key, Base64-encode every value into the
//!   write buffer and flush once the buffered point count reaches the
//!   configured threshold.
//! - `read` is a scan of `[key, key + 1)` returning the first row.
//! - `scan` covers `[start, start + count)` (`count == 0` reads one key), or
//!   `[0, i64::MAX)` when scan-all is configured.
//! - `cleanup` flushes whatever is still buffered and tears the backend down.
//!
//! Failures never escape as Rust errors: they are logged and turned into a
//! [`Status`]. A failed flush still leaves the buffer empty, so a later flush
//! never resends rows that were already attempted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, error, warn};

use crate::backend::{Backend, BackendError, ScanResult};
use crate::codec::{decode_value, encode_value};
use crate::config::{
    BUFFER_INSERT_BY_COLUMN, BUFFER_POINTS, ConfigResult, Properties, SCAN_ALL,
};
use crate::flush::FlushPolicy;
use crate::model::{Key, KeyedRow, ScanWindow, field_name, join_path, parse_key};
use crate::payload::PayloadLayout;
use crate::write_buffer::WriteBuffer;

/// Field name to raw value, as exchanged with the harness.
pub type FieldMap = BTreeMap<String, Vec<u8>>;

/// Outcome of one harness operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation succeeded.
    Ok,
    /// The operation succeeded but matched no data.
    NotFound,
    /// The operation is not supported by the active backend.
    NotImplemented,
    /// The operation failed; details were logged.
    Error,
}

impl Status {
    /// Harness spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "NOT_FOUND",
            Status::NotImplemented => "NOT_IMPLEMENTED",
            Status::Error => "ERROR",
        }
    }

    /// True for [`Status::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayConfig {
    /// Buffered points that trigger a flush; `0` flushes on every insert.
    pub buffer_points: usize,
    /// Layout handed to the backend at flush time.
    pub layout: PayloadLayout,
    /// Replace every scan window with `[0, i64::MAX)`.
    pub scan_all: bool,
}

impl GatewayConfig {
    /// Read `buffer.*` and `scan.all`.
    pub fn from_properties(props: &Properties) -> ConfigResult<Self> {
        let layout = if props.bool(BUFFER_INSERT_BY_COLUMN, false)? {
            PayloadLayout::ColumnMajor
        } else {
            PayloadLayout::RowMajor
        };
        Ok(Self {
            buffer_points: props.usize(BUFFER_POINTS, 0)?,
            layout,
            scan_all: props.bool(SCAN_ALL, false)?,
        })
    }
}

/// One harness client bound to one backend.
///
/// Every operation takes `&mut self`: a gateway and its buffer belong to a
/// single worker, and concurrent workers each own their own gateway.
pub struct Gateway {
    backend: Box<dyn Backend>,
    buffer: WriteBuffer,
    policy: FlushPolicy,
    config: GatewayConfig,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("backend", &self.backend.name())
            .field("buffered_points", &self.buffer.point_count())
            .field("config", &self.config)
            .finish()
    }
}

impl Gateway {
    /// Gateway over `backend`.
    pub fn new(backend: Box<dyn Backend>, config: GatewayConfig) -> Self {
        Self {
            backend,
            buffer: WriteBuffer::new(),
            policy: FlushPolicy::new(config.buffer_points),
            config,
        }
    }

    /// Gateway over `backend` configured from properties.
    pub fn from_properties(backend: Box<dyn Backend>, props: &Properties) -> ConfigResult<Self> {
        Ok(Self::new(backend, GatewayConfig::from_properties(props)?))
    }

    /// Active settings.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Points buffered and not yet flushed.
    pub fn buffered_points(&self) -> usize {
        self.buffer.point_count()
    }

    fn key(&self, op: &'static str, key: &str) -> Option<Key> {
        match parse_key(key) {
            Ok(k) => Some(k),
            Err(err) => {
                error!(op, key, error = %err, "invalid key");
                None
            }
        }
    }

    /// Buffer every field of `values` under `key`, flushing when the
    /// threshold is reached.
    pub fn insert(&mut self, table: &str, key: &str, values: &FieldMap) -> Status {
        let Some(key) = self.key("insert", key) else {
            return Status::Error;
        };

        for (field, value) in values {
            self.buffer
                .add(key, join_path(table, field), encode_value(value));
        }

        if self.policy.should_flush(self.buffer.point_count()) {
            self.flush()
        } else {
            Status::Ok
        }
    }

    /// Same as [`Gateway::insert`]; a repeated write overwrites.
    pub fn update(&mut self, table: &str, key: &str, values: &FieldMap) -> Status {
        self.insert(table, key, values)
    }

    /// Hand everything buffered to the backend.
    ///
    /// The buffer is empty afterwards whatever the outcome.
    pub fn flush(&mut self) -> Status {
        if self.buffer.is_empty() {
            return Status::Ok;
        }
        let snapshot = self.buffer.drain();
        let payload = snapshot.materialize(self.config.layout);
        debug!(
            backend = self.backend.name(),
            rows = snapshot.len(),
            points = snapshot.point_count(),
            "flushing write buffer"
        );

        match self.backend.bulk_write(payload) {
            Ok(()) => Status::Ok,
            Err(err) => {
                error!(
                    backend = self.backend.name(),
                    rows = snapshot.len(),
                    error = %err,
                    "bulk write failed, buffered rows dropped"
                );
                Status::Error
            }
        }
    }

    /// Read the row stored at `key` into `result`.
    pub fn read(
        &mut self,
        table: &str,
        key: &str,
        fields: Option<&BTreeSet<String>>,
        result: &mut FieldMap,
    ) -> Status {
        let Some(key) = self.key("read", key) else {
            return Status::Error;
        };

        match self.scan_window("read", table, ScanWindow::point(key), fields) {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => match decode_row(row) {
                    Ok(decoded) => {
                        *result = decoded;
                        Status::Ok
                    }
                    Err(status) => status,
                },
                None => Status::NotFound,
            },
            Err(status) => status,
        }
    }

    /// Read up to `record_count` consecutive keys starting at `start_key`
    /// into `result`.
    pub fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&BTreeSet<String>>,
        result: &mut Vec<FieldMap>,
    ) -> Status {
        let Some(start) = self.key("scan", start_key) else {
            return Status::Error;
        };

        let interval = i64::try_from(record_count.max(1)).unwrap_or(i64::MAX);
        let window = if self.config.scan_all {
            ScanWindow::all()
        } else {
            ScanWindow::new(start, interval)
        };

        let rows = match self.scan_window("scan", table, window, fields) {
            Ok(rows) => rows,
            Err(status) => return status,
        };
        if rows.is_empty() {
            return Status::NotFound;
        }

        let mut decoded = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row(row) {
                Ok(fields) => decoded.push(fields),
                Err(status) => return status,
            }
        }
        *result = decoded;
        Status::Ok
    }

    /// Delete the row stored at `key`.
    pub fn delete(&mut self, table: &str, key: &str) -> Status {
        let Some(key) = self.key("delete", key) else {
            return Status::Error;
        };

        match self.backend.delete(table, key) {
            Ok(()) => Status::Ok,
            Err(err) => self.failure("delete", table, err),
        }
    }

    /// Flush the remaining buffer, then tear the backend down.
    pub fn cleanup(&mut self) -> Status {
        let flushed = self.flush();
        let torn_down = match self.backend.teardown() {
            Ok(()) => Status::Ok,
            Err(err) => self.failure("teardown", "", err),
        };
        if flushed.is_ok() { torn_down } else { flushed }
    }

    fn scan_window(
        &mut self,
        op: &'static str,
        table: &str,
        window: ScanWindow,
        fields: Option<&BTreeSet<String>>,
    ) -> Result<Vec<KeyedRow>, Status> {
        match self.backend.scan(table, window, fields) {
            Ok(ScanResult::Found(rows)) => Ok(rows),
            Ok(ScanResult::NotFound) => {
                warn!(
                    op,
                    table,
                    start = window.start,
                    end = window.end(),
                    "no rows in scan window"
                );
                Ok(Vec::new())
            }
            Err(err) => Err(self.failure(op, table, err)),
        }
    }

    fn failure(&self, op: &'static str, table: &str, err: BackendError) -> Status {
        if err.is_unsupported() {
            debug!(op, backend = self.backend.name(), error = %err, "not implemented");
            Status::NotImplemented
        } else {
            error!(op, backend = self.backend.name(), table, error = %err, "backend call failed");
            Status::Error
        }
    }
}

/// Strip the table prefix from every path and decode every value.
fn decode_row(row: KeyedRow) -> Result<FieldMap, Status> {
    let mut out = FieldMap::new();
    for (path, value) in row.row {
        match decode_value(&value) {
            Ok(raw) => {
                out.insert(field_name(&path).to_string(), raw);
            }
            Err(err) => {
                error!(key = row.key, path = %path, error = %err, "stored value is not valid base64");
                return Err(Status::Error);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::session::memory::{MemorySession, MemoryStore};
    use crate::backend::session::{RemoteBackend, SessionEndpoint};
    use crate::backend::BackendResult;
    use crate::payload::BulkPayload;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    fn memory_gateway(config: GatewayConfig) -> Result<(Gateway, MemoryStore), BackendError> {
        let session = MemorySession::new();
        let store = session.store();
        let backend = RemoteBackend::connect(session, &SessionEndpoint::default())?;
        Ok((Gateway::new(Box::new(backend), config), store))
    }

    #[derive(Debug, Default)]
    struct RecordingBackend {
        payloads: Arc<Mutex<Vec<BulkPayload>>>,
        fail: bool,
        stored: Vec<KeyedRow>,
    }

    impl Backend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn bulk_write(&mut self, payload: BulkPayload) -> BackendResult<()> {
            self.payloads.lock().expect("lock").push(payload);
            if self.fail {
                return Err(BackendError::external("recording", "disk full"));
            }
            Ok(())
        }

        fn scan(
            &mut self,
            _table: &str,
            _window: ScanWindow,
            _fields: Option<&BTreeSet<String>>,
        ) -> BackendResult<ScanResult> {
            Ok(ScanResult::from_rows(self.stored.clone()))
        }

        fn teardown(&mut self) -> BackendResult<()> {
            Ok(())
        }
    }

    #[test]
    fn gateway_config_reads_properties() -> TestResult {
        let props = Properties::new()
            .with(BUFFER_POINTS, "100")
            .with(BUFFER_INSERT_BY_COLUMN, "true")
            .with(SCAN_ALL, "false");
        let cfg = GatewayConfig::from_properties(&props)?;
        assert_eq!(cfg.buffer_points, 100);
        assert_eq!(cfg.layout, PayloadLayout::ColumnMajor);
        assert!(!cfg.scan_all);

        let bad = Properties::new().with(BUFFER_POINTS, "lots");
        assert!(GatewayConfig::from_properties(&bad).is_err());
        Ok(())
    }

    #[test]
    fn buffered_insert_flushes_at_threshold() -> TestResult {
        let (mut gw, store) = memory_gateway(GatewayConfig {
            buffer_points: 4,
            ..GatewayConfig::default()
        })?;

        let status = gw.insert("t", "user1", &fields(&[("a", "x"), ("b", "y")]));
        assert_eq!(status, Status::Ok);
        assert_eq!(gw.buffered_points(), 2);
        assert_eq!(store.insert_calls(), 0);

        gw.insert("t", "user2", &fields(&[("a", "z"), ("b", "w")]));
        assert_eq!(gw.buffered_points(), 0);
        assert_eq!(store.insert_calls(), 1);
        assert_eq!(store.point_count(), 4);
        Ok(())
    }

    #[test]
    fn values_are_stored_base64_encoded() -> TestResult {
        let (mut gw, store) = memory_gateway(GatewayConfig::default())?;
        gw.insert("t", "user5", &fields(&[("a", "hi")]));

        let rows = store.rows();
        assert_eq!(rows[&5]["t.a"], Bytes::from_static(b"aGk="));
        Ok(())
    }

    #[test]
    fn failed_flush_empties_buffer_and_reports_error() {
        let mut gw = Gateway::new(
            Box::new(RecordingBackend {
                fail: true,
                ..Default::default()
            }),
            GatewayConfig {
                buffer_points: 2,
                ..GatewayConfig::default()
            },
        );

        assert_eq!(gw.insert("t", "user1", &fields(&[("a", "x")])), Status::Ok);
        assert_eq!(
            gw.insert("t", "user2", &fields(&[("a", "y")])),
            Status::Error
        );
        assert_eq!(gw.buffered_points(), 0);
        assert_eq!(gw.flush(), Status::Ok);
    }

    #[test]
    fn bad_keys_are_errors() -> TestResult {
        let (mut gw, _) = memory_gateway(GatewayConfig::default())?;
        assert_eq!(gw.insert("t", "usr", &fields(&[("a", "x")])), Status::Error);
        assert_eq!(gw.insert("t", "userX1", &fields(&[("a", "x")])), Status::Error);
        let mut out = FieldMap::new();
        assert_eq!(gw.read("t", "bad", None, &mut out), Status::Error);
        assert_eq!(gw.delete("t", "u"), Status::Error);
        Ok(())
    }

    #[test]
    fn undecodable_stored_value_is_an_error() {
        let good = KeyedRow::new(1, [("t.a".to_string(), Bytes::from_static(b"eA=="))].into());
        let bad = KeyedRow::new(2, [("t.a".to_string(), Bytes::from_static(b"not base64!"))].into());
        let gateway = |stored: Vec<KeyedRow>| {
            Gateway::new(
                Box::new(RecordingBackend {
                    stored,
                    ..Default::default()
                }),
                GatewayConfig::default(),
            )
        };

        let mut gw = gateway(vec![bad.clone()]);
        let mut row = fields(&[("keep", "me")]);
        assert_eq!(gw.read("t", "user2", None, &mut row), Status::Error);
        assert_eq!(row, fields(&[("keep", "me")]));

        // a bad value after a good one still leaves the result untouched
        let mut gw = gateway(vec![good, bad]);
        let mut rows = vec![fields(&[("keep", "me")])];
        assert_eq!(gw.scan("t", "user1", 2, None, &mut rows), Status::Error);
        assert_eq!(rows, vec![fields(&[("keep", "me")])]);
    }

    #[test]
    fn delete_without_support_is_not_implemented() {
        let mut gw = Gateway::new(Box::<RecordingBackend>::default(), GatewayConfig::default());
        assert_eq!(gw.delete("t", "user1"), Status::NotImplemented);
    }

    #[test]
    fn cleanup_flushes_remainder_in_configured_layout() {
        let backend = RecordingBackend::default();
        let payloads = Arc::clone(&backend.payloads);
        let mut gw = Gateway::new(
            Box::new(backend),
            GatewayConfig {
                buffer_points: 100,
                layout: PayloadLayout::ColumnMajor,
                ..GatewayConfig::default()
            },
        );
        assert_eq!(gw.insert("t", "user1", &fields(&[("a", "x")])), Status::Ok);
        assert!(payloads.lock().expect("lock").is_empty());

        assert_eq!(gw.cleanup(), Status::Ok);
        let seen = payloads.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].layout(), PayloadLayout::ColumnMajor);
        assert_eq!(seen[0].keys(), &[1]);
    }

    #[test]
    fn status_spelling() {
        assert_eq!(Status::NotImplemented.as_str(), "NOT_IMPLEMENTED");
        assert_eq!(Status::NotFound.to_string(), "NOT_FOUND");
        assert!(Status::Ok.is_ok());
        assert!(!Status::Error.is_ok());
    }
}
